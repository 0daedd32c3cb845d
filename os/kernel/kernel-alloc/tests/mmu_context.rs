mod common;

use common::{Manager, boot, machine};
use kernel_info::memory::RECURSIVE_ENTRY;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress, VirtualPageNumber};
use kernel_vmem::{DirectoryEntry, DirectoryEntryKind, Mmu, PageEntryBits};

const USER_PAGE: VirtualPageNumber = VirtualPageNumber::new(0x400);
/// First page covered by directory entry 769.
const FAR_KERNEL_PAGE: VirtualPageNumber = VirtualPageNumber::new(0xC0400);

fn with_contexts(mm: &mut Manager<'_>) {
    mm.mmu_init().unwrap();
    assert!(mm.find_cache("Mmu_context").is_some());
}

#[test]
fn context_cache_uses_two_page_slabs() {
    let machine = machine();
    let mut mm = boot(&machine);
    with_contexts(&mut mm);

    let cache = mm.find_cache("Mmu_context").unwrap();
    let info = mm.cache_info(cache);
    assert_eq!(info.object_size(), 12);
    assert_eq!(info.pages_per_slab(), 2);
    assert_eq!(info.objects_per_slab(), 682);
}

#[test]
fn new_context_has_an_empty_mapped_directory() {
    let machine = machine();
    let mut mm = boot(&machine);
    with_contexts(&mut mm);

    let id = mm.context_create().unwrap();
    let context = mm.context(id);
    assert_eq!(
        mm.translate(context.window()),
        Some(context.directory().base())
    );
    assert!(!mm.pages().is_free(context.directory()));
    for index in 0..1024 {
        let bits = machine.read_phys_u32(context.directory().base() + index * 4);
        assert_eq!(bits, 0, "entry {index}");
    }
    assert_eq!(mm.active_context(), None);
}

#[test]
fn loading_shares_the_kernel_half() {
    let machine = machine();
    let mut mm = boot(&machine);
    with_contexts(&mut mm);

    let id = mm.context_create().unwrap();
    let directory = mm.context(id).directory();
    let loads = machine.directory_loads();

    mm.context_load(id);
    assert_eq!(mm.active_context(), Some(id));
    assert_eq!(machine.directory_loads(), loads + 1);
    assert_eq!(machine.current_directory(), directory.base());

    let own = DirectoryEntry::from_bits(
        machine.read_phys_u32(directory.base() + u32::try_from(RECURSIVE_ENTRY).unwrap() * 4),
    );
    assert_eq!(own.kind(), Some(DirectoryEntryKind::Table(directory)));

    // Kernel data is still where it was.
    let slab_records = VirtualAddress::new(0xC011_7000);
    assert_eq!(
        mm.translate(slab_records),
        Some(PhysicalAddress::new(0x0011_9000))
    );
    assert_eq!(mm.cache_info(mm.slab_cache()).name(), "Slab");
}

#[test]
fn user_mappings_stay_private() {
    let machine = machine();
    let mut mm = boot(&machine);
    with_contexts(&mut mm);

    let a = mm.context_create().unwrap();
    let b = mm.context_create().unwrap();
    let frame = mm.pages_mut().alloc_frame().unwrap();

    mm.context_load(a);
    mm.map(frame, USER_PAGE, PageEntryBits::new_user_rw()).unwrap();
    mm.memory().write(USER_PAGE.base(), 0xCAFE_u32);
    assert_eq!(mm.translate(USER_PAGE.base()), Some(frame.base()));

    mm.context_load(b);
    assert_eq!(mm.translate(USER_PAGE.base()), None);

    mm.load_kernel_context();
    assert_eq!(mm.active_context(), None);
    assert_eq!(machine.current_directory(), mm.kernel_directory().base());
    assert_eq!(mm.translate(USER_PAGE.base()), None);

    mm.context_load(a);
    assert_eq!(mm.memory().read::<u32>(USER_PAGE.base()), 0xCAFE);
}

#[test]
fn kernel_tables_follow_the_kernel_back() {
    let machine = machine();
    let mut mm = boot(&machine);
    with_contexts(&mut mm);

    let id = mm.context_create().unwrap();
    let frame = mm.pages_mut().alloc_frame().unwrap();

    mm.context_load(id);
    mm.map(frame, FAR_KERNEL_PAGE, PageEntryBits::new_kernel_rw()).unwrap();
    mm.load_kernel_context();

    assert_eq!(mm.translate(FAR_KERNEL_PAGE.base()), Some(frame.base()));

    // A context created later sees the new table when loaded.
    let later = mm.context_create().unwrap();
    mm.context_load(later);
    assert_eq!(mm.translate(FAR_KERNEL_PAGE.base()), Some(frame.base()));
}

#[test]
fn destroy_returns_everything_but_user_frames() {
    let machine = machine();
    let mut mm = boot(&machine);
    with_contexts(&mut mm);

    // Keeps the context slab alive.
    let _keep = mm.context_create().unwrap();
    let free_frames = mm.pages().stats().free_frames;
    let free_pages = mm.regions().free_pages();

    let id = mm.context_create().unwrap();
    let frame = mm.pages_mut().alloc_frame().unwrap();
    mm.context_load(id);
    mm.map(frame, USER_PAGE, PageEntryBits::new_user_rw()).unwrap();
    mm.load_kernel_context();

    mm.context_destroy(id);
    assert_eq!(mm.pages().stats().free_frames, free_frames - 1);
    assert_eq!(mm.regions().free_pages(), free_pages);

    mm.pages_mut().free_frame(frame);
    assert_eq!(mm.pages().stats().free_frames, free_frames);

    let cache = mm.find_cache("Mmu_context").unwrap();
    assert_eq!(mm.cache_info(cache).used_objects(), 1);
}

#[test]
#[should_panic(expected = "destroying the loaded")]
fn loaded_context_cannot_be_destroyed() {
    let machine = machine();
    let mut mm = boot(&machine);
    with_contexts(&mut mm);

    let id = mm.context_create().unwrap();
    mm.context_load(id);
    mm.context_destroy(id);
}

#[test]
#[should_panic(expected = "before mmu_init")]
fn contexts_need_init() {
    let machine = machine();
    let mut mm = boot(&machine);
    let _ = mm.context_create();
}
