//! Ordered spatial index from [`CellKey`] to a cell payload.
//!
//! A B-tree with minimum degree `t`: every node other than the root holds
//! between `t - 1` and `2t - 1` keys, internal nodes have one more child than
//! keys, and all leaves sit at the same depth. Search, insert and delete touch
//! `O(log_t n)` nodes.
//!
//! Insertion splits full nodes on the way down, and deletion tops up thin
//! children on the way down (borrowing from a sibling or merging with one), so
//! neither operation ever has to walk back up the tree.

use std::mem;

use super::cell::CellKey;

/// Smallest minimum degree used by [`SpatialIndex::for_input`].
pub const MIN_DEGREE: usize = 2;

/// Largest minimum degree used by [`SpatialIndex::for_input`].
pub const MAX_DEGREE: usize = 64;

#[derive(Clone, Debug)]
struct Node<V> {
    keys: Vec<CellKey>,
    vals: Vec<V>,
    /// Empty for leaves.
    children: Vec<Node<V>>,
}

impl<V> Node<V> {
    fn leaf() -> Self {
        Self {
            keys: Vec::new(),
            vals: Vec::new(),
            children: Vec::new(),
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn get(&self, key: &CellKey) -> Option<&V> {
        let mut node = self;
        loop {
            match node.keys.binary_search(key) {
                Ok(i) => return Some(&node.vals[i]),
                Err(_) if node.is_leaf() => return None,
                Err(i) => node = &node.children[i],
            }
        }
    }

    fn get_mut(&mut self, key: &CellKey) -> Option<&mut V> {
        match self.keys.binary_search(key) {
            Ok(i) => Some(&mut self.vals[i]),
            Err(_) if self.is_leaf() => None,
            Err(i) => self.children[i].get_mut(key),
        }
    }

    /// Split the full child `i` around its median, which moves up into `self`.
    fn split_child(&mut self, i: usize, t: usize) {
        let child = &mut self.children[i];
        debug_assert_eq!(child.keys.len(), 2 * t - 1);

        let right_keys = child.keys.split_off(t);
        let right_vals = child.vals.split_off(t);
        let right_children = if child.is_leaf() {
            Vec::new()
        } else {
            child.children.split_off(t)
        };
        let median_key = child.keys.remove(t - 1);
        let median_val = child.vals.remove(t - 1);

        self.keys.insert(i, median_key);
        self.vals.insert(i, median_val);
        self.children.insert(
            i + 1,
            Node {
                keys: right_keys,
                vals: right_vals,
                children: right_children,
            },
        );
    }

    /// Insert a key known to be absent into a node that is not full.
    fn insert_non_full(&mut self, key: CellKey, val: V, t: usize) {
        let mut i = match self.keys.binary_search(&key) {
            Ok(i) | Err(i) => i,
        };
        if self.is_leaf() {
            self.keys.insert(i, key);
            self.vals.insert(i, val);
            return;
        }
        if self.children[i].keys.len() == 2 * t - 1 {
            self.split_child(i, t);
            if key > self.keys[i] {
                i += 1;
            }
        }
        self.children[i].insert_non_full(key, val, t);
    }

    fn remove(&mut self, key: &CellKey, t: usize) -> Option<V> {
        match self.keys.binary_search(key) {
            Ok(i) if self.is_leaf() => {
                self.keys.remove(i);
                Some(self.vals.remove(i))
            }
            Ok(i) => {
                if self.children[i].keys.len() >= t {
                    let (k, v) = self.children[i].pop_max(t);
                    self.keys[i] = k;
                    Some(mem::replace(&mut self.vals[i], v))
                } else if self.children[i + 1].keys.len() >= t {
                    let (k, v) = self.children[i + 1].pop_min(t);
                    self.keys[i] = k;
                    Some(mem::replace(&mut self.vals[i], v))
                } else {
                    self.merge_children(i);
                    self.children[i].remove(key, t)
                }
            }
            Err(_) if self.is_leaf() => None,
            Err(i) => {
                let i = self.fill_child(i, t);
                self.children[i].remove(key, t)
            }
        }
    }

    fn pop_max(&mut self, t: usize) -> (CellKey, V) {
        if self.is_leaf() {
            let last = self.keys.len() - 1;
            return (self.keys.remove(last), self.vals.remove(last));
        }
        let i = self.fill_child(self.children.len() - 1, t);
        self.children[i].pop_max(t)
    }

    fn pop_min(&mut self, t: usize) -> (CellKey, V) {
        if self.is_leaf() {
            return (self.keys.remove(0), self.vals.remove(0));
        }
        let i = self.fill_child(0, t);
        self.children[i].pop_min(t)
    }

    /// Make sure child `i` has at least `t` keys before descending into it.
    ///
    /// Returns the index of the child that now covers the same key range
    /// (it moves left by one when merged into its left sibling).
    fn fill_child(&mut self, i: usize, t: usize) -> usize {
        if self.children[i].keys.len() >= t {
            return i;
        }
        if i > 0 && self.children[i - 1].keys.len() >= t {
            self.borrow_from_left(i);
            i
        } else if i + 1 < self.children.len() && self.children[i + 1].keys.len() >= t {
            self.borrow_from_right(i);
            i
        } else if i + 1 < self.children.len() {
            self.merge_children(i);
            i
        } else {
            self.merge_children(i - 1);
            i - 1
        }
    }

    fn borrow_from_left(&mut self, i: usize) {
        let (left, right) = self.children.split_at_mut(i);
        let sibling = &mut left[i - 1];
        let child = &mut right[0];

        let last = sibling.keys.len() - 1;
        let k = mem::replace(&mut self.keys[i - 1], sibling.keys.remove(last));
        let v = mem::replace(&mut self.vals[i - 1], sibling.vals.remove(last));
        child.keys.insert(0, k);
        child.vals.insert(0, v);
        if !sibling.is_leaf() {
            let moved = sibling.children.remove(sibling.children.len() - 1);
            child.children.insert(0, moved);
        }
    }

    fn borrow_from_right(&mut self, i: usize) {
        let (left, right) = self.children.split_at_mut(i + 1);
        let child = &mut left[i];
        let sibling = &mut right[0];

        let k = mem::replace(&mut self.keys[i], sibling.keys.remove(0));
        let v = mem::replace(&mut self.vals[i], sibling.vals.remove(0));
        child.keys.push(k);
        child.vals.push(v);
        if !sibling.is_leaf() {
            child.children.push(sibling.children.remove(0));
        }
    }

    /// Merge child `i + 1` and separator `i` into child `i`.
    fn merge_children(&mut self, i: usize) {
        let Node {
            keys,
            vals,
            children,
        } = self.children.remove(i + 1);
        let sep_key = self.keys.remove(i);
        let sep_val = self.vals.remove(i);

        let child = &mut self.children[i];
        child.keys.push(sep_key);
        child.vals.push(sep_val);
        child.keys.extend(keys);
        child.vals.extend(vals);
        child.children.extend(children);
    }
}

/// B-tree map from [`CellKey`] to `V`.
///
/// Keys are unique; inserting an existing key replaces its value.
#[derive(Clone, Debug)]
pub struct SpatialIndex<V> {
    root: Node<V>,
    degree: usize,
    len: usize,
}

impl<V> SpatialIndex<V> {
    /// Create an empty index with minimum degree `degree` (clamped to at least 2).
    ///
    /// Nodes hold up to `2 * degree - 1` keys and `2 * degree` children.
    pub fn with_degree(degree: usize) -> Self {
        Self {
            root: Node::leaf(),
            degree: degree.max(MIN_DEGREE),
            len: 0,
        }
    }

    /// Create an index sized for `rows` entries of dimensionality `dims`.
    ///
    /// The degree grows with `rows / (4 * dims - 1)`; it only affects speed.
    pub fn for_input(rows: usize, dims: usize) -> Self {
        let per_key = (4 * dims.max(1)).saturating_sub(1).max(1);
        Self::with_degree((rows / per_key).clamp(MIN_DEGREE, MAX_DEGREE))
    }

    /// Minimum degree of the tree.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Look up the value stored under `key`.
    pub fn search(&self, key: &CellKey) -> Option<&V> {
        self.root.get(key)
    }

    /// Mutable lookup.
    pub fn search_mut(&mut self, key: &CellKey) -> Option<&mut V> {
        self.root.get_mut(key)
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.search(key).is_some()
    }

    /// Insert `val` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: CellKey, val: V) -> Option<V> {
        if let Some(slot) = self.root.get_mut(&key) {
            return Some(mem::replace(slot, val));
        }

        let t = self.degree;
        if self.root.keys.len() == 2 * t - 1 {
            let old_root = mem::replace(&mut self.root, Node::leaf());
            self.root.children.push(old_root);
            self.root.split_child(0, t);
        }
        self.root.insert_non_full(key, val, t);
        self.len += 1;
        None
    }

    /// Remove `key`, returning its value.
    pub fn delete(&mut self, key: &CellKey) -> Option<V> {
        let removed = self.root.remove(key, self.degree);
        if self.root.keys.is_empty() && !self.root.is_leaf() {
            self.root = self.root.children.remove(0);
        }
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// In-order iterator over `(key, value)` pairs.
    pub fn iter(&self) -> Iter<'_, V> {
        let mut iter = Iter {
            stack: Vec::new(),
            remaining: self.len,
        };
        iter.descend_left(&self.root);
        iter
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &CellKey> {
        self.iter().map(|(k, _)| k)
    }

    /// Values in key order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Number of levels (1 for a lone root).
    pub fn height(&self) -> usize {
        let mut node = &self.root;
        let mut height = 1;
        while !node.is_leaf() {
            node = &node.children[0];
            height += 1;
        }
        height
    }
}

impl<V> Default for SpatialIndex<V> {
    fn default() -> Self {
        Self::with_degree(MIN_DEGREE)
    }
}

/// In-order iterator returned by [`SpatialIndex::iter`].
pub struct Iter<'a, V> {
    /// `(node, i)`: children `..=i` are done, key `i` is next.
    stack: Vec<(&'a Node<V>, usize)>,
    remaining: usize,
}

impl<'a, V> Iter<'a, V> {
    fn descend_left(&mut self, mut node: &'a Node<V>) {
        loop {
            self.stack.push((node, 0));
            if node.is_leaf() {
                break;
            }
            node = &node.children[0];
        }
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a CellKey, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, i)) = self.stack.pop() {
            if i < node.keys.len() {
                self.stack.push((node, i + 1));
                if !node.is_leaf() {
                    self.descend_left(&node.children[i + 1]);
                }
                self.remaining -= 1;
                return Some((&node.keys[i], &node.vals[i]));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, V> IntoIterator for &'a SpatialIndex<V> {
    type Item = (&'a CellKey, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn key(a: u32, b: u32) -> CellKey {
        CellKey::new(vec![a, b])
    }

    /// Check B-tree shape invariants; returns leaf depth.
    fn check_node<V>(node: &Node<V>, t: usize, is_root: bool, depth: usize) -> usize {
        assert!(node.keys.len() <= 2 * t - 1, "node overflow");
        if !is_root {
            assert!(node.keys.len() >= t - 1, "node underflow");
        }
        assert_eq!(node.keys.len(), node.vals.len());
        assert!(node.keys.windows(2).all(|w| w[0] < w[1]), "keys unsorted");
        if node.is_leaf() {
            return depth;
        }
        assert_eq!(node.children.len(), node.keys.len() + 1);
        let depths: Vec<usize> = node
            .children
            .iter()
            .map(|c| check_node(c, t, false, depth + 1))
            .collect();
        assert!(depths.windows(2).all(|w| w[0] == w[1]), "uneven leaves");
        depths[0]
    }

    fn check<V>(index: &SpatialIndex<V>) {
        check_node(&index.root, index.degree, true, 1);
        assert_eq!(index.iter().count(), index.len());
    }

    #[test]
    fn search_insert_replace() {
        let mut index = SpatialIndex::with_degree(2);
        assert!(index.search(&key(0, 0)).is_none());
        assert!(index.insert(key(0, 0), "a").is_none());
        assert!(index.insert(key(1, 0), "b").is_none());
        assert_eq!(index.insert(key(0, 0), "c"), Some("a"));
        assert_eq!(index.len(), 2);
        assert_eq!(index.search(&key(0, 0)), Some(&"c"));
        *index.search_mut(&key(1, 0)).unwrap() = "d";
        assert_eq!(index.search(&key(1, 0)), Some(&"d"));
    }

    #[test]
    fn many_inserts_stay_balanced_and_ordered() {
        let mut index = SpatialIndex::with_degree(2);
        // scrambled insertion order
        for i in 0..400u32 {
            let k = (i * 7919) % 400;
            index.insert(key(k / 20, k % 20), k);
        }
        check(&index);
        assert_eq!(index.len(), 400);
        assert!(index.height() > 2);

        let keys: Vec<&CellKey> = index.keys().collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        for k in 0..400u32 {
            assert_eq!(index.search(&key(k / 20, k % 20)), Some(&k));
        }
    }

    #[test]
    fn delete_matches_btreemap() {
        for degree in [2, 3, 5] {
            let mut index = SpatialIndex::with_degree(degree);
            let mut model = BTreeMap::new();
            for i in 0..300u32 {
                let k = key((i * 31) % 17, (i * 13) % 23);
                index.insert(k.clone(), i);
                model.insert(k, i);
            }
            check(&index);

            for i in 0..300u32 {
                let k = key((i * 7) % 17, (i * 11) % 23);
                assert_eq!(index.delete(&k), model.remove(&k), "degree {degree}");
                if i % 25 == 0 {
                    check(&index);
                }
            }
            check(&index);
            assert_eq!(index.len(), model.len());
            let ours: Vec<(&CellKey, &u32)> = index.iter().collect();
            let theirs: Vec<(&CellKey, &u32)> = model.iter().collect();
            assert_eq!(ours, theirs);
        }
    }

    #[test]
    fn delete_everything_shrinks_to_empty_leaf() {
        let mut index = SpatialIndex::with_degree(3);
        for i in 0..100u32 {
            index.insert(key(i, 0), i);
        }
        for i in (0..100u32).rev() {
            assert_eq!(index.delete(&key(i, 0)), Some(i));
        }
        assert!(index.is_empty());
        assert_eq!(index.height(), 1);
        assert!(index.delete(&key(0, 0)).is_none());
    }

    #[test]
    fn degree_from_input_size() {
        assert_eq!(SpatialIndex::<()>::for_input(0, 2).degree(), MIN_DEGREE);
        // 700 / (4*2 - 1) = 100, clamped
        assert_eq!(SpatialIndex::<()>::for_input(700, 2).degree(), MAX_DEGREE);
        // 140 / 7 = 20
        assert_eq!(SpatialIndex::<()>::for_input(140, 2).degree(), 20);
    }
}
