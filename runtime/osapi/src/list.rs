//! Index-linked lists
//!
//! Doubly-linked lists threaded through a shared array of `Link`s instead of
//! heap nodes. Several lists can share one link array as long as every index
//! belongs to at most one of them at a time, which is how the object pool
//! keeps its free and allocated sets: moving an element between them is two
//! O(1) relinks and never moves the element itself.
//!
//! A list does not know which indices it holds; callers track membership.

/// Per-index link cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Link {
    prev: Option<usize>,
    next: Option<usize>,
}

/// Head of one list threaded through a link array
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexList {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl IndexList {
    /// Create an empty list
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Number of linked indices
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First index in the list
    #[inline]
    pub fn front(&self) -> Option<usize> {
        self.head
    }

    /// Append `index` at the tail
    ///
    /// `index` must not currently be linked into any list sharing `links`.
    pub fn push_back(&mut self, links: &mut [Link], index: usize) {
        links[index] = Link {
            prev: self.tail,
            next: None,
        };

        match self.tail {
            Some(tail) => links[tail].next = Some(index),
            None => self.head = Some(index),
        }

        self.tail = Some(index);
        self.len += 1;
    }

    /// Remove and return the head index
    pub fn pop_front(&mut self, links: &mut [Link]) -> Option<usize> {
        let head = self.head?;
        self.unlink(links, head);
        Some(head)
    }

    /// Remove `index` from the list
    ///
    /// `index` must currently be linked into this list.
    pub fn unlink(&mut self, links: &mut [Link], index: usize) {
        debug_assert!(self.len > 0, "unlink from empty list");
        let Link { prev, next } = links[index];

        match prev {
            Some(prev) => links[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => links[next].prev = prev,
            None => self.tail = prev,
        }

        links[index] = Link::default();
        self.len -= 1;
    }

    /// Index following `index`
    #[inline]
    pub fn next(links: &[Link], index: usize) -> Option<usize> {
        links[index].next
    }

    /// Iterate the list from head to tail
    pub fn iter<'a>(&self, links: &'a [Link]) -> Iter<'a> {
        Iter {
            links,
            cursor: self.head,
        }
    }
}

/// Iterator over an `IndexList`
pub struct Iter<'a> {
    links: &'a [Link],
    cursor: Option<usize>,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.cursor?;
        self.cursor = self.links[current].next;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &IndexList, links: &[Link]) -> Vec<usize> {
        list.iter(links).collect()
    }

    #[test]
    fn test_push_back_keeps_order() {
        let mut links = vec![Link::default(); 4];
        let mut list = IndexList::new();
        for i in [2, 0, 3] {
            list.push_back(&mut links, i);
        }
        assert_eq!(collect(&list, &links), vec![2, 0, 3]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.front(), Some(2));
    }

    #[test]
    fn test_unlink_middle_head_tail() {
        let mut links = vec![Link::default(); 5];
        let mut list = IndexList::new();
        for i in 0..5 {
            list.push_back(&mut links, i);
        }

        list.unlink(&mut links, 2);
        assert_eq!(collect(&list, &links), vec![0, 1, 3, 4]);
        list.unlink(&mut links, 0);
        assert_eq!(collect(&list, &links), vec![1, 3, 4]);
        list.unlink(&mut links, 4);
        assert_eq!(collect(&list, &links), vec![1, 3]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_two_lists_share_links() {
        let mut links = vec![Link::default(); 4];
        let mut free = IndexList::new();
        let mut used = IndexList::new();
        for i in 0..4 {
            free.push_back(&mut links, i);
        }

        let a = free.pop_front(&mut links).unwrap();
        let b = free.pop_front(&mut links).unwrap();
        used.push_back(&mut links, a);
        used.push_back(&mut links, b);

        assert_eq!(collect(&free, &links), vec![2, 3]);
        assert_eq!(collect(&used, &links), vec![0, 1]);

        used.unlink(&mut links, a);
        free.push_back(&mut links, a);
        assert_eq!(collect(&free, &links), vec![2, 3, 0]);
        assert_eq!(collect(&used, &links), vec![1]);
    }

    #[test]
    fn test_pop_front_empty() {
        let mut links: Vec<Link> = Vec::new();
        let mut list = IndexList::new();
        assert_eq!(list.pop_front(&mut links), None);
        assert!(list.is_empty());
    }
}
