//! Persistent ordered map.
//!
//! An AVL tree whose nodes are shared through `Arc`. Every update copies
//! only the path from the root to the changed node and returns a new map;
//! the old map stays valid and unchanged for anyone still holding it.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Link<K, V> = Option<Arc<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    height: u8,
    left: Link<K, V>,
    right: Link<K, V>,
}

fn height<K, V>(link: &Link<K, V>) -> u8 {
    link.as_ref().map_or(0, |n| n.height)
}

fn make<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    let height = 1 + height(&left).max(height(&right));
    Arc::new(Node {
        key,
        value,
        height,
        left,
        right,
    })
}

/// Builds a node from subtrees whose heights differ by at most two,
/// rotating to restore the AVL invariant.
fn balance<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let (hl, hr) = (height(&left), height(&right));

    if hl > hr + 1 {
        if let Some(l) = &left {
            return match &l.right {
                Some(lr) if height(&l.left) < height(&l.right) => make(
                    lr.key.clone(),
                    lr.value.clone(),
                    Some(make(
                        l.key.clone(),
                        l.value.clone(),
                        l.left.clone(),
                        lr.left.clone(),
                    )),
                    Some(make(key, value, lr.right.clone(), right)),
                ),
                _ => make(
                    l.key.clone(),
                    l.value.clone(),
                    l.left.clone(),
                    Some(make(key, value, l.right.clone(), right)),
                ),
            };
        }
    } else if hr > hl + 1 {
        if let Some(r) = &right {
            return match &r.left {
                Some(rl) if height(&r.right) < height(&r.left) => make(
                    rl.key.clone(),
                    rl.value.clone(),
                    Some(make(key, value, left, rl.left.clone())),
                    Some(make(
                        r.key.clone(),
                        r.value.clone(),
                        rl.right.clone(),
                        r.right.clone(),
                    )),
                ),
                _ => make(
                    r.key.clone(),
                    r.value.clone(),
                    Some(make(key, value, left, r.left.clone())),
                    r.right.clone(),
                ),
            };
        }
    }
    make(key, value, left, right)
}

fn insert<K: Ord + Clone, V: Clone>(link: &Link<K, V>, key: K, value: V) -> (Arc<Node<K, V>>, bool) {
    let node = match link {
        None => return (make(key, value, None, None), false),
        Some(node) => node,
    };
    match key.cmp(&node.key) {
        Ordering::Less => {
            let (left, replaced) = insert(&node.left, key, value);
            let rebuilt = balance(
                node.key.clone(),
                node.value.clone(),
                Some(left),
                node.right.clone(),
            );
            (rebuilt, replaced)
        }
        Ordering::Greater => {
            let (right, replaced) = insert(&node.right, key, value);
            let rebuilt = balance(
                node.key.clone(),
                node.value.clone(),
                node.left.clone(),
                Some(right),
            );
            (rebuilt, replaced)
        }
        Ordering::Equal => (
            make(key, value, node.left.clone(), node.right.clone()),
            true,
        ),
    }
}

fn remove_min<K: Clone, V: Clone>(node: &Arc<Node<K, V>>) -> (K, V, Link<K, V>) {
    match &node.left {
        None => (node.key.clone(), node.value.clone(), node.right.clone()),
        Some(left) => {
            let (key, value, rest) = remove_min(left);
            let rebuilt = balance(node.key.clone(), node.value.clone(), rest, node.right.clone());
            (key, value, Some(rebuilt))
        }
    }
}

fn remove<K: Ord + Clone, V: Clone>(link: &Link<K, V>, key: &K) -> Option<(Link<K, V>, V)> {
    let node = link.as_ref()?;
    match key.cmp(&node.key) {
        Ordering::Less => {
            let (left, removed) = remove(&node.left, key)?;
            let rebuilt = balance(node.key.clone(), node.value.clone(), left, node.right.clone());
            Some((Some(rebuilt), removed))
        }
        Ordering::Greater => {
            let (right, removed) = remove(&node.right, key)?;
            let rebuilt = balance(node.key.clone(), node.value.clone(), node.left.clone(), right);
            Some((Some(rebuilt), removed))
        }
        Ordering::Equal => {
            let replacement = match (&node.left, &node.right) {
                (None, right) => right.clone(),
                (left, None) => left.clone(),
                (left, Some(right)) => {
                    let (k, v, rest) = remove_min(right);
                    Some(balance(k, v, left.clone(), rest))
                }
            };
            Some((replacement, node.value.clone()))
        }
    }
}

/// An immutable, structurally shared ordered map.
pub struct PersistentMap<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PersistentMap<K, V> {
    fn default() -> Self {
        Self { root: None, len: 0 }
    }
}

impl<K: Ord + Clone, V: Clone> PersistentMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Looks a key up.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut link = self.root.as_ref();
        while let Some(node) = link {
            link = match key.cmp(&node.key) {
                Ordering::Less => node.left.as_ref(),
                Ordering::Greater => node.right.as_ref(),
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns a new map with `key` set to `value`.
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        let (root, replaced) = insert(&self.root, key, value);
        Self {
            root: Some(root),
            len: if replaced { self.len } else { self.len + 1 },
        }
    }

    /// Returns a new map without `key`, or `None` if it was absent.
    #[must_use]
    pub fn remove(&self, key: &K) -> Option<(Self, V)> {
        let (root, removed) = remove(&self.root, key)?;
        Some((
            Self {
                root,
                len: self.len - 1,
            },
            removed,
        ))
    }

    /// In-order iterator.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter {
            stack: Vec::with_capacity(usize::from(height(&self.root))),
            remaining: self.len,
        };
        iter.push_left(self.root.as_ref());
        iter
    }

    /// Values in key order.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    #[cfg(test)]
    fn height(&self) -> u8 {
        height(&self.root)
    }
}

impl<K: fmt::Debug + Ord + Clone, V: fmt::Debug + Clone> fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// In-order iterator over a [`PersistentMap`].
pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut link: Option<&'a Arc<Node<K, V>>>) {
        while let Some(node) = link {
            self.stack.push(node);
            link = node.left.as_ref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_ref());
        self.remaining = self.remaining.saturating_sub(1);
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_iterate() {
        let mut map = PersistentMap::new();
        for k in [5, 3, 8, 1, 4, 7, 9, 2, 6] {
            map = map.insert(k, k * 10);
        }
        assert_eq!(map.len(), 9);
        assert_eq!(map.get(&4), Some(&40));
        assert_eq!(map.get(&42), None);
        let keys: Vec<_> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (1..=9).collect::<Vec<_>>());

        let replaced = map.insert(4, 0);
        assert_eq!(replaced.len(), 9);
        assert_eq!(replaced.get(&4), Some(&0));
    }

    #[test]
    fn test_old_versions_survive() {
        let v1 = PersistentMap::new().insert("a", 1).insert("b", 2);
        let v2 = v1.insert("c", 3);
        let (v3, removed) = v2.remove(&"a").unwrap();

        assert_eq!(removed, 1);
        assert_eq!(v1.len(), 2);
        assert!(!v1.contains_key(&"c"));
        assert_eq!(v2.len(), 3);
        assert!(v2.contains_key(&"a"));
        assert_eq!(v3.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec!["b", "c"]);
        assert!(v3.remove(&"a").is_none());
    }

    #[test]
    fn test_stays_balanced() {
        let mut map = PersistentMap::new();
        for k in 0..1024 {
            map = map.insert(k, ());
        }
        assert!(map.height() <= 14, "height {}", map.height());

        for k in (0..1024).step_by(2) {
            map = map.remove(&k).unwrap().0;
        }
        assert_eq!(map.len(), 512);
        assert!(map.height() <= 14);
        assert!(map.iter().all(|(k, _)| k % 2 == 1));
    }
}
