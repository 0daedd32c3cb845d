//! # Circular doubly linked lists over handles
//!
//! The links live inside the listed records (page descriptors, slab and
//! cache records); the list itself only remembers its head. A [`ListNodes`]
//! implementation knows how to read and write the links of a handle.

/// Link storage for a family of list nodes.
pub trait ListNodes {
    type Handle: Copy + Eq;

    fn prev(&self, node: Self::Handle) -> Self::Handle;
    fn next(&self, node: Self::Handle) -> Self::Handle;
    fn set_prev(&self, node: Self::Handle, prev: Self::Handle);
    fn set_next(&self, node: Self::Handle, next: Self::Handle);
}

/// Head of a circular doubly linked list; `head.prev` is the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircularList<H> {
    head: Option<H>,
}

impl<H> Default for CircularList<H> {
    fn default() -> Self {
        Self { head: None }
    }
}

impl<H: Copy + Eq> CircularList<H> {
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// A list whose head is stored elsewhere, e.g. in a record field.
    #[must_use]
    pub const fn from_head(head: Option<H>) -> Self {
        Self { head }
    }

    #[must_use]
    pub const fn head(&self) -> Option<H> {
        self.head
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn push_tail<N: ListNodes<Handle = H>>(&mut self, nodes: &N, node: H) {
        match self.head {
            None => {
                nodes.set_prev(node, node);
                nodes.set_next(node, node);
                self.head = Some(node);
            }
            Some(head) => {
                let tail = nodes.prev(head);
                nodes.set_next(tail, node);
                nodes.set_prev(node, tail);
                nodes.set_next(node, head);
                nodes.set_prev(head, node);
            }
        }
    }

    pub fn push_head<N: ListNodes<Handle = H>>(&mut self, nodes: &N, node: H) {
        self.push_tail(nodes, node);
        self.head = Some(node);
    }

    pub fn pop_head<N: ListNodes<Handle = H>>(&mut self, nodes: &N) -> Option<H> {
        let head = self.head?;
        self.remove(nodes, head);
        Some(head)
    }

    /// Unlink `node`, which must be on this list.
    ///
    /// # Panics
    /// If `node` is alone on a list that is not this one.
    pub fn remove<N: ListNodes<Handle = H>>(&mut self, nodes: &N, node: H) {
        let next = nodes.next(node);
        if next == node {
            assert!(self.head == Some(node), "node is not on this list");
            self.head = None;
            return;
        }

        let prev = nodes.prev(node);
        nodes.set_next(prev, next);
        nodes.set_prev(next, prev);
        if self.head == Some(node) {
            self.head = Some(next);
        }
    }

    /// Walk from head to tail. The list must not change while iterating.
    pub fn iter<N: ListNodes<Handle = H>>(&self, nodes: N) -> Iter<N> {
        Iter {
            nodes,
            head: self.head,
            next: self.head,
        }
    }

    #[must_use]
    pub fn len<N: ListNodes<Handle = H>>(&self, nodes: N) -> usize {
        self.iter(nodes).count()
    }

    #[must_use]
    pub fn contains<N: ListNodes<Handle = H>>(&self, nodes: N, node: H) -> bool {
        self.iter(nodes).any(|n| n == node)
    }
}

pub struct Iter<N: ListNodes> {
    nodes: N,
    head: Option<N::Handle>,
    next: Option<N::Handle>,
}

impl<N: ListNodes> Iterator for Iter<N> {
    type Item = N::Handle;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let following = self.nodes.next(current);
        self.next = (Some(following) != self.head).then_some(following);
        Some(current)
    }
}

impl<T: ListNodes + ?Sized> ListNodes for &T {
    type Handle = T::Handle;

    fn prev(&self, node: Self::Handle) -> Self::Handle {
        (**self).prev(node)
    }

    fn next(&self, node: Self::Handle) -> Self::Handle {
        (**self).next(node)
    }

    fn set_prev(&self, node: Self::Handle, prev: Self::Handle) {
        (**self).set_prev(node, prev);
    }

    fn set_next(&self, node: Self::Handle, next: Self::Handle) {
        (**self).set_next(node, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// Links in a plain array, handles are indices.
    struct Arena {
        links: [(Cell<usize>, Cell<usize>); 8],
    }

    impl Arena {
        fn new() -> Self {
            Self {
                links: core::array::from_fn(|_| (Cell::new(usize::MAX), Cell::new(usize::MAX))),
            }
        }
    }

    impl ListNodes for Arena {
        type Handle = usize;

        fn prev(&self, node: usize) -> usize {
            self.links[node].0.get()
        }

        fn next(&self, node: usize) -> usize {
            self.links[node].1.get()
        }

        fn set_prev(&self, node: usize, prev: usize) {
            self.links[node].0.set(prev);
        }

        fn set_next(&self, node: usize, next: usize) {
            self.links[node].1.set(next);
        }
    }

    fn collect(list: &CircularList<usize>, arena: &Arena) -> Vec<usize> {
        list.iter(arena).collect()
    }

    #[test]
    fn push_tail_and_head_order() {
        let arena = Arena::new();
        let mut list = CircularList::new();
        list.push_tail(&arena, 1);
        list.push_tail(&arena, 2);
        list.push_head(&arena, 0);
        list.push_tail(&arena, 3);
        assert_eq!(collect(&list, &arena), [0, 1, 2, 3]);
        assert_eq!(arena.prev(0), 3);
        assert_eq!(list.len(&arena), 4);
    }

    #[test]
    fn remove_head_middle_and_last() {
        let arena = Arena::new();
        let mut list = CircularList::new();
        for i in 0..4 {
            list.push_tail(&arena, i);
        }
        list.remove(&arena, 2);
        assert_eq!(collect(&list, &arena), [0, 1, 3]);
        list.remove(&arena, 0);
        assert_eq!(list.head(), Some(1));
        assert_eq!(collect(&list, &arena), [1, 3]);
        assert_eq!(list.pop_head(&arena), Some(1));
        assert_eq!(list.pop_head(&arena), Some(3));
        assert!(list.is_empty());
        assert_eq!(list.pop_head(&arena), None);
        assert_eq!(list.iter(&arena).next(), None);
    }

    #[test]
    fn head_can_live_outside_the_list() {
        let arena = Arena::new();
        let mut list = CircularList::new();
        list.push_tail(&arena, 5);
        list.push_tail(&arena, 6);

        let stored = list.head();
        let mut again = CircularList::from_head(stored);
        assert!(again.contains(&arena, 6));
        again.remove(&arena, 5);
        assert_eq!(collect(&again, &arena), [6]);
    }

    #[test]
    #[should_panic(expected = "not on this list")]
    fn removing_foreign_singleton_panics() {
        let arena = Arena::new();
        let mut a = CircularList::new();
        let mut b = CircularList::new();
        a.push_tail(&arena, 1);
        b.push_tail(&arena, 2);
        a.remove(&arena, 2);
    }
}
