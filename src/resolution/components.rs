//! Disjoint-set forest over dense arena indices.
//!
//! Equivalence edges are not transitive on their own; the connected
//! components of the edge graph are. Union by rank with path halving keeps
//! every operation near-constant.

/// Union-find structure over `0..len`.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    /// Creates `len` singleton sets.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Returns true if the forest has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Returns the representative of `x`'s set.
    ///
    /// # Panics
    /// Panics if `x` is out of range.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            let grandparent = self.parent[self.parent[x]];
            self.parent[x] = grandparent;
            x = grandparent;
        }
        x
    }

    /// Merges the sets of `a` and `b`. Returns false if they were already one set.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }

    /// Returns true if `a` and `b` are in the same set.
    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Groups the elements accepted by `include` into their sets.
    ///
    /// Each group is sorted ascending and groups are ordered by their
    /// smallest element, so the output is independent of union order.
    pub fn groups(&mut self, mut include: impl FnMut(usize) -> bool) -> Vec<Vec<usize>> {
        let mut by_root: std::collections::HashMap<usize, Vec<usize>> =
            std::collections::HashMap::new();
        for x in 0..self.len() {
            if include(x) {
                let root = self.find(x);
                by_root.entry(root).or_default().push(x);
            }
        }
        let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
        for g in &mut groups {
            g.sort_unstable();
        }
        groups.sort_by_key(|g| g[0]);
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_is_transitive() {
        let mut ds = DisjointSet::new(5);
        assert!(ds.union(0, 1));
        assert!(ds.union(1, 2));
        assert!(!ds.union(0, 2));
        assert!(ds.connected(0, 2));
        assert!(!ds.connected(0, 3));
    }

    #[test]
    fn test_groups_are_deterministic() {
        let mut a = DisjointSet::new(6);
        a.union(4, 1);
        a.union(5, 3);
        a.union(1, 0);

        let mut b = DisjointSet::new(6);
        b.union(0, 1);
        b.union(3, 5);
        b.union(1, 4);

        let ga = a.groups(|_| true);
        let gb = b.groups(|_| true);
        assert_eq!(ga, gb);
        assert_eq!(ga, vec![vec![0, 1, 4], vec![2], vec![3, 5]]);
    }

    #[test]
    fn test_groups_filter() {
        let mut ds = DisjointSet::new(4);
        ds.union(0, 1);
        let groups = ds.groups(|x| x != 2);
        assert_eq!(groups, vec![vec![0, 1], vec![3]]);
    }
}
