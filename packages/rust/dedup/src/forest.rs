//! Approximate nearest neighbours under angular (cosine) distance.
//!
//! A forest of random-hyperplane trees. Each split picks two random items
//! and cuts the space with the hyperplane through the origin that separates
//! them. Queries walk all trees at once through a priority queue keyed by
//! the smallest margin seen on the path, collect about `k * trees`
//! candidates, and rank them by exact distance.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use mojarung_shared::{MojarungError, Result};

use crate::vector::{dot, normalize};

/// Items per leaf before a node is split.
const LEAF_SIZE: usize = 8;

enum Node {
    Leaf(Vec<usize>),
    Split {
        normal: Vec<f32>,
        left: usize,
        right: usize,
    },
}

struct Tree {
    nodes: Vec<Node>,
    root: usize,
}

/// Random-hyperplane forest over unit-normalised copies of the input vectors.
pub struct AngularForest {
    vectors: Vec<Vec<f32>>,
    trees: Vec<Tree>,
}

impl AngularForest {
    /// Index `vectors` with `trees` trees. The same seed always yields the
    /// same forest. All vectors must share one dimension.
    pub fn build(vectors: &[Vec<f32>], trees: usize, seed: u64) -> Result<Self> {
        let dimension = vectors.first().map_or(0, Vec::len);
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(MojarungError::validation(format!(
                "vector {bad} has dimension {}, expected {dimension}",
                vectors[bad].len()
            )));
        }

        let vectors: Vec<Vec<f32>> = vectors
            .iter()
            .map(|v| {
                let mut v = v.clone();
                normalize(&mut v);
                v
            })
            .collect();

        let mut rng = fastrand::Rng::with_seed(seed);
        let ids: Vec<usize> = (0..vectors.len()).collect();
        let trees = (0..trees.max(1))
            .map(|_| {
                let mut nodes = Vec::new();
                let root = build_node(&vectors, ids.clone(), &mut rng, &mut nodes);
                Tree { nodes, root }
            })
            .collect();

        Ok(Self { vectors, trees })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Up to `k` nearest items to indexed item `item`, closest first. The
    /// item itself is normally the first entry.
    pub fn nearest(&self, item: usize, k: usize) -> Vec<usize> {
        match self.vectors.get(item) {
            Some(query) => self.search(query, k),
            None => Vec::new(),
        }
    }

    /// Up to `k` nearest items to an arbitrary query vector.
    pub fn nearest_to(&self, query: &[f32], k: usize) -> Vec<usize> {
        let mut query = query.to_vec();
        normalize(&mut query);
        self.search(&query, k)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<usize> {
        if k == 0 || self.vectors.is_empty() {
            return Vec::new();
        }
        let search_k = k * self.trees.len();

        let mut queue: BinaryHeap<Pending> = self
            .trees
            .iter()
            .enumerate()
            .map(|(tree, t)| Pending {
                priority: f32::INFINITY,
                tree,
                node: t.root,
            })
            .collect();

        let mut seen = vec![false; self.vectors.len()];
        let mut candidates = Vec::new();
        while candidates.len() < search_k {
            let Some(next) = queue.pop() else { break };
            match &self.trees[next.tree].nodes[next.node] {
                Node::Leaf(ids) => {
                    for &id in ids {
                        if !seen[id] {
                            seen[id] = true;
                            candidates.push(id);
                        }
                    }
                }
                Node::Split {
                    normal,
                    left,
                    right,
                } => {
                    let margin = dot(normal, query);
                    queue.push(Pending {
                        priority: next.priority.min(margin),
                        tree: next.tree,
                        node: *right,
                    });
                    queue.push(Pending {
                        priority: next.priority.min(-margin),
                        tree: next.tree,
                        node: *left,
                    });
                }
            }
        }

        let mut ranked: Vec<(f32, usize)> = candidates
            .into_iter()
            .map(|id| (1.0 - dot(query, &self.vectors[id]), id))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.into_iter().take(k).map(|(_, id)| id).collect()
    }
}

fn build_node(
    vectors: &[Vec<f32>],
    mut ids: Vec<usize>,
    rng: &mut fastrand::Rng,
    nodes: &mut Vec<Node>,
) -> usize {
    if ids.len() <= LEAF_SIZE {
        nodes.push(Node::Leaf(ids));
        return nodes.len() - 1;
    }

    let a = rng.usize(..ids.len());
    let mut b = rng.usize(..ids.len() - 1);
    if b >= a {
        b += 1;
    }
    let mut normal: Vec<f32> = vectors[ids[a]]
        .iter()
        .zip(&vectors[ids[b]])
        .map(|(x, y)| x - y)
        .collect();
    normalize(&mut normal);

    let (mut right, mut left): (Vec<usize>, Vec<usize>) = ids
        .iter()
        .copied()
        .partition(|&id| dot(&normal, &vectors[id]) > 0.0);

    // Identical vectors cannot be separated by a hyperplane; split at random.
    if left.is_empty() || right.is_empty() {
        rng.shuffle(&mut ids);
        right = ids.split_off(ids.len() / 2);
        left = ids;
        normal.iter_mut().for_each(|x| *x = 0.0);
    }

    let left = build_node(vectors, left, rng, nodes);
    let right = build_node(vectors, right, rng, nodes);
    nodes.push(Node::Split {
        normal,
        left,
        right,
    });
    nodes.len() - 1
}

/// Queue entry: a node to visit and the smallest margin on the way to it.
struct Pending {
    priority: f32,
    tree: usize,
    node: usize,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = fastrand::Rng::with_seed(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.f32() * 2.0 - 1.0).collect())
            .collect()
    }

    fn brute_force(vectors: &[Vec<f32>], item: usize, k: usize) -> Vec<usize> {
        let mut ranked: Vec<(f32, usize)> = vectors
            .iter()
            .enumerate()
            .map(|(id, v)| (1.0 - crate::cosine_similarity(&vectors[item], v), id))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.into_iter().take(k).map(|(_, id)| id).collect()
    }

    #[test]
    fn exhaustive_search_is_exact() {
        // 50 items, k * trees = 50 candidates: every item is visited.
        let vectors = random_vectors(50, 16, 7);
        let forest = AngularForest::build(&vectors, 10, 42).expect("build");
        for item in [0, 13, 49] {
            assert_eq!(forest.nearest(item, 5), brute_force(&vectors, item, 5));
        }
    }

    #[test]
    fn item_finds_itself_first() {
        let vectors = random_vectors(500, 32, 3);
        let forest = AngularForest::build(&vectors, 10, 1).expect("build");
        for item in [0, 250, 499] {
            let nearest = forest.nearest(item, 5);
            assert_eq!(nearest.len(), 5);
            assert_eq!(nearest[0], item);
        }
    }

    #[test]
    fn same_seed_same_answers() {
        let vectors = random_vectors(300, 8, 11);
        let a = AngularForest::build(&vectors, 4, 99).expect("build");
        let b = AngularForest::build(&vectors, 4, 99).expect("build");
        for item in 0..20 {
            assert_eq!(a.nearest(item, 3), b.nearest(item, 3));
        }
    }

    #[test]
    fn identical_vectors_do_not_recurse_forever() {
        let vectors = vec![vec![1.0, 1.0, 0.0]; 40];
        let forest = AngularForest::build(&vectors, 3, 5).expect("build");
        assert_eq!(forest.nearest(10, 5).len(), 5);
    }

    #[test]
    fn small_and_empty_inputs() {
        let forest = AngularForest::build(&[], 10, 0).expect("build");
        assert!(forest.is_empty());
        assert!(forest.nearest(0, 5).is_empty());

        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let forest = AngularForest::build(&vectors, 10, 0).expect("build");
        assert_eq!(forest.nearest(1, 5), vec![1, 0]);
        assert!(forest.nearest(1, 0).is_empty());
        assert!(forest.nearest(7, 5).is_empty());
        assert_eq!(forest.nearest_to(&[3.0, 0.1], 1), vec![0]);
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let vectors = vec![vec![1.0, 0.0], vec![1.0]];
        let err = AngularForest::build(&vectors, 2, 0).err().expect("error");
        assert!(matches!(err, MojarungError::Validation { .. }));
    }
}
