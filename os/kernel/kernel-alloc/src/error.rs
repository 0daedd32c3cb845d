use kernel_vmem::MapError;

/// Resource exhaustion reported by the allocation entry points.
///
/// Everything else (double frees, foreign objects, bad orders) is a bug in
/// the caller and panics instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("no free block of physical frames large enough")]
    OutOfFrames,
    #[error("no free kernel virtual region large enough")]
    OutOfVirtualSpace,
    #[error("no physical frame left for a new page table")]
    OutOfPageTables,
    #[error("objects of {size} bytes do not fit a slab of {pages} page(s)")]
    ObjectTooLarge { size: u32, pages: u32 },
}

impl From<MapError> for AllocError {
    fn from(value: MapError) -> Self {
        match value {
            MapError::OutOfPageTables => Self::OutOfPageTables,
        }
    }
}
