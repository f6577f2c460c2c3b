//! Binary heap ordered by a caller-supplied "less" function

/// Heap where `less(a, b) == true` means `a` pops before `b`
pub struct PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    items: Vec<T>,
    less: F,
}

impl<T, F> PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    pub fn new(less: F) -> Self {
        Self {
            items: Vec::new(),
            less,
        }
    }

    pub fn with_capacity(capacity: usize, less: F) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            less,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let top = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        top
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !(self.less)(&self.items[idx], &self.items[parent]) {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut first = idx;
            if left < len && (self.less)(&self.items[left], &self.items[first]) {
                first = left;
            }
            if right < len && (self.less)(&self.items[right], &self.items[first]) {
                first = right;
            }
            if first == idx {
                break;
            }
            self.items.swap(idx, first);
            idx = first;
        }
    }
}

impl<T, F> Extend<T> for PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_heap_order() {
        let mut queue = PriorityQueue::new(|a: &i32, b: &i32| a < b);
        queue.extend([5, 1, 4, 2, 3, 2]);
        assert_eq!(queue.len(), 6);
        assert_eq!(queue.peek(), Some(&1));

        let mut popped = Vec::new();
        while let Some(item) = queue.pop() {
            popped.push(item);
        }
        assert_eq!(popped, vec![1, 2, 2, 3, 4, 5]);
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_custom_order() {
        let mut queue = PriorityQueue::with_capacity(3, |a: &(&str, u32), b: &(&str, u32)| {
            a.1 > b.1 || (a.1 == b.1 && a.0 < b.0)
        });
        queue.push(("low", 1));
        queue.push(("high-b", 9));
        queue.push(("high-a", 9));

        assert_eq!(queue.pop(), Some(("high-a", 9)));
        assert_eq!(queue.pop(), Some(("high-b", 9)));
        assert_eq!(queue.pop(), Some(("low", 1)));
    }
}
