use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embed::{embed_all, BatchOptions, EmbeddingProvider};
use crate::error::Result;
use crate::model::{Cluster, Record};
use crate::text::clean_html;
use crate::vector::SimilarityMatrix;

/// How the similarity between two clusters is measured while merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Highest pairwise similarity. Same partition as connected components
    /// of the at-or-above-threshold graph.
    #[default]
    Single,
    /// Mean pairwise similarity.
    Average,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Linkage::Single => f.write_str("single"),
            Linkage::Average => f.write_str("average"),
        }
    }
}

impl FromStr for Linkage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Linkage::Single),
            "average" => Ok(Linkage::Average),
            other => Err(format!(
                "unknown linkage '{other}' (expected single or average)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    /// Fewer than two records; no provider call was made.
    NotEnoughItems,
    /// Clusters with at least two members. May be empty.
    Groups(Vec<Cluster>),
}

/// Disjoint-set forest over `0..n` with path halving and union by size.
#[derive(Debug, Clone)]
struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }

    fn groups(mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut slot_of_root = vec![usize::MAX; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for i in 0..n {
            let root = self.find(i);
            if slot_of_root[root] == usize::MAX {
                slot_of_root[root] = groups.len();
                groups.push(Vec::new());
            }
            groups[slot_of_root[root]].push(i);
        }

        groups
    }
}

fn single_linkage(matrix: &SimilarityMatrix, threshold: f32) -> Vec<Vec<usize>> {
    let mut sets = DisjointSet::new(matrix.len());
    for (i, j) in matrix.edges_at_least(threshold) {
        sets.union(i, j);
    }
    sets.groups()
}

/// Repeatedly merges the pair of clusters with the highest mean pairwise
/// similarity while that mean is at least `threshold`. Ties go to the pair
/// with the lowest indices.
fn average_linkage(matrix: &SimilarityMatrix, threshold: f32) -> Vec<Vec<usize>> {
    let n = matrix.len();
    let mut members: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();
    let mut link: Vec<Vec<f64>> = (0..n)
        .map(|i| matrix.row(i).iter().map(|s| *s as f64).collect())
        .collect();

    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..n {
            if members[a].is_none() {
                continue;
            }
            for b in (a + 1)..n {
                if members[b].is_none() {
                    continue;
                }
                let score = link[a][b];
                if best.map_or(true, |(_, _, s)| score > s) {
                    best = Some((a, b, score));
                }
            }
        }

        let Some((a, b, score)) = best else { break };
        if score < threshold as f64 {
            break;
        }

        let merged = members[b].take().unwrap_or_default();
        let size_a = members[a].as_ref().map_or(0, Vec::len) as f64;
        let size_b = merged.len() as f64;

        // Lance-Williams update for the mean over all cross pairs.
        for k in 0..n {
            if k == a || members[k].is_none() {
                continue;
            }
            let updated = (size_a * link[a][k] + size_b * link[b][k]) / (size_a + size_b);
            link[a][k] = updated;
            link[k][a] = updated;
        }

        if let Some(target) = members[a].as_mut() {
            target.extend(merged);
        }
    }

    members.into_iter().flatten().collect()
}

/// Full partition of `0..matrix.len()`, singletons included. Members are
/// ascending and clusters are ordered by their first member.
pub fn partition(matrix: &SimilarityMatrix, threshold: f32, linkage: Linkage) -> Vec<Vec<usize>> {
    let mut groups = match linkage {
        Linkage::Single => single_linkage(matrix, threshold),
        Linkage::Average => average_linkage(matrix, threshold),
    };

    for group in &mut groups {
        group.sort_unstable();
    }
    groups.sort_by_key(|g| g[0]);
    groups
}

/// Clusters of at least two indices, ordered as in [`partition`].
pub fn cluster_indices<V: AsRef<[f32]>>(
    vectors: &[V],
    threshold: f32,
    linkage: Linkage,
) -> Result<Vec<Vec<usize>>> {
    let matrix = SimilarityMatrix::build(vectors)?;
    Ok(partition(&matrix, threshold, linkage)
        .into_iter()
        .filter(|g| g.len() > 1)
        .collect())
}

/// Groups corpus records whose questions are mutually similar.
pub async fn group(
    corpus: &[Record],
    embedder: &dyn EmbeddingProvider,
    threshold: f32,
    linkage: Linkage,
    options: &BatchOptions,
) -> Result<GroupOutcome> {
    if corpus.len() < 2 {
        return Ok(GroupOutcome::NotEnoughItems);
    }

    let texts: Vec<String> = corpus.iter().map(|r| clean_html(&r.question)).collect();
    let vectors = embed_all(embedder, &texts, options).await?;
    let clusters = cluster_indices(&vectors, threshold, linkage)?;

    debug!(
        corpus = corpus.len(),
        clusters = clusters.len(),
        %linkage,
        "clustered corpus"
    );

    Ok(GroupOutcome::Groups(
        clusters
            .into_iter()
            .map(|members| members.into_iter().map(|i| corpus[i].clone()).collect())
            .collect(),
    ))
}
