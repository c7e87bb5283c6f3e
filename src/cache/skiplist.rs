//! Skip List Module
//!
//! Ordered index over `(score, member)` pairs. Every forward link records a
//! span (the number of level-0 nodes it jumps over) so rank lookups and
//! rank-range removals run in O(log n) rather than walking level 0.
//!
//! Nodes live in an arena and link to each other by slot index; slot 0 is
//! the head sentinel.

use rand::Rng;

// == Constants ==
/// Highest level a node can be promoted to
pub const MAX_LEVEL: usize = 32;

/// Chance that a node entering level `i` also enters level `i + 1`
const PROMOTION_PROBABILITY: f64 = 0.25;

const HEAD: usize = 0;

// == Index Entry ==
/// A `(member, score)` pair as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Member identity
    pub member: String,
    /// Ordering score
    pub score: i64,
    /// Write version the node was inserted under; 0 if unversioned
    pub version: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    forward: Option<usize>,
    span: usize,
}

#[derive(Debug)]
struct Node {
    member: String,
    score: i64,
    version: u64,
    backward: Option<usize>,
    links: Vec<Link>,
}

impl Node {
    fn new(member: String, score: i64, version: u64, level: usize) -> Self {
        Self {
            member,
            score,
            version,
            backward: None,
            links: vec![Link::default(); level],
        }
    }

    /// Strict `(score, member)` ordering.
    fn precedes(&self, score: i64, member: &str) -> bool {
        self.score < score || (self.score == score && self.member.as_str() < member)
    }

    fn matches(&self, score: i64, member: &str) -> bool {
        self.score == score && self.member == member
    }

    fn entry(&self) -> IndexEntry {
        IndexEntry {
            member: self.member.clone(),
            score: self.score,
            version: self.version,
        }
    }
}

// == Skip List ==
/// Probabilistic ordered list sorted by score ascending, then member ascending.
///
/// The list does not deduplicate members: callers remove the stale
/// `(member, old_score)` node before inserting a member under a new score.
#[derive(Debug)]
pub struct SkipList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    tail: Option<usize>,
    length: usize,
    level: usize,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    // == Constructor ==
    /// Creates an empty skip list.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(String::new(), i64::MIN, 0, MAX_LEVEL)],
            free: Vec::new(),
            tail: None,
            length: 0,
            level: 1,
        }
    }

    // == Length ==
    /// Returns the number of live nodes.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns true if the list holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    // == Insert ==
    /// Inserts a node for `(member, score)` at its ordered position.
    pub fn insert(&mut self, member: String, score: i64) {
        self.insert_versioned(member, score, 0);
    }

    /// Like [`SkipList::insert`], tagging the node with the write version
    /// that produced it. The version plays no part in ordering.
    pub fn insert_versioned(&mut self, member: String, score: i64, version: u64) {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];
        let mut x = HEAD;

        for i in (0..self.level).rev() {
            rank[i] = if i + 1 == self.level { 0 } else { rank[i + 1] };
            while let Some(next) = self.forward(x, i) {
                if !self.nodes[next].precedes(score, &member) {
                    break;
                }
                rank[i] += self.span(x, i);
                x = next;
            }
            update[i] = x;
        }

        let level = random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEAD;
                self.nodes[HEAD].links[i].span = self.length;
            }
            self.level = level;
        }

        let idx = self.alloc(Node::new(member, score, version, level));
        for i in 0..level {
            let prev = update[i];
            let prev_link = self.nodes[prev].links[i];
            let offset = rank[0] - rank[i];
            self.nodes[idx].links[i] = Link {
                forward: prev_link.forward,
                span: prev_link.span - offset,
            };
            self.nodes[prev].links[i] = Link {
                forward: Some(idx),
                span: offset + 1,
            };
        }
        // Levels above the new node now jump over one more node
        for (i, &prev) in update.iter().enumerate().take(self.level).skip(level) {
            self.nodes[prev].links[i].span += 1;
        }

        self.nodes[idx].backward = (update[0] != HEAD).then_some(update[0]);
        match self.forward(idx, 0) {
            Some(next) => self.nodes[next].backward = Some(idx),
            None => self.tail = Some(idx),
        }
        self.length += 1;
    }

    // == Remove ==
    /// Removes the node matching exactly `(member, score)`.
    ///
    /// Returns None when no such node exists.
    pub fn remove(&mut self, member: &str, score: i64) -> Option<IndexEntry> {
        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;

        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if !self.nodes[next].precedes(score, member) {
                    break;
                }
                x = next;
            }
            update[i] = x;
        }

        let candidate = self.forward(x, 0)?;
        if !self.nodes[candidate].matches(score, member) {
            return None;
        }
        Some(self.delete_node(candidate, &update))
    }

    // == Remove Range By Score ==
    /// Removes every node with `min <= score <= max`, in ascending order.
    pub fn remove_range_by_score(&mut self, min: i64, max: i64) -> Vec<IndexEntry> {
        let mut removed = Vec::new();
        if min > max {
            return removed;
        }

        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if self.nodes[next].score >= min {
                    break;
                }
                x = next;
            }
            update[i] = x;
        }

        let mut cursor = self.forward(x, 0);
        while let Some(idx) = cursor {
            if self.nodes[idx].score > max {
                break;
            }
            cursor = self.forward(idx, 0);
            removed.push(self.delete_node(idx, &update));
        }
        removed
    }

    // == Remove Range By Rank ==
    /// Removes nodes whose 1-based rank lies in `[start, stop)`.
    pub fn remove_range_by_rank(&mut self, start: usize, stop: usize) -> Vec<IndexEntry> {
        let mut removed = Vec::new();
        let start = start.max(1);
        if start >= stop || start > self.length {
            return removed;
        }

        let mut update = [HEAD; MAX_LEVEL];
        let mut traversed = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if traversed + self.span(x, i) >= start {
                    break;
                }
                traversed += self.span(x, i);
                x = next;
            }
            update[i] = x;
        }

        traversed += 1;
        let mut cursor = self.forward(x, 0);
        while let Some(idx) = cursor {
            if traversed >= stop {
                break;
            }
            cursor = self.forward(idx, 0);
            removed.push(self.delete_node(idx, &update));
            traversed += 1;
        }
        removed
    }

    // == Range By Score ==
    /// Returns nodes with `min <= score <= max`.
    ///
    /// The first `offset` matches are skipped and at most `limit` are
    /// returned (`None` = unbounded). `descending` walks from the highest
    /// score down using the backward links.
    pub fn range_by_score(
        &self,
        min: i64,
        max: i64,
        offset: usize,
        limit: Option<usize>,
        descending: bool,
    ) -> Vec<IndexEntry> {
        let mut out = Vec::new();
        if limit == Some(0) {
            return out;
        }

        let mut cursor = if descending {
            self.last_in_score_range(min, max)
        } else {
            self.first_in_score_range(min, max)
        };
        let mut skipped = 0;
        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            if node.score < min || node.score > max {
                break;
            }
            if skipped < offset {
                skipped += 1;
            } else {
                out.push(node.entry());
                if limit.is_some_and(|limit| out.len() >= limit) {
                    break;
                }
            }
            cursor = if descending {
                node.backward
            } else {
                node.links[0].forward
            };
        }
        out
    }

    // == Range By Rank ==
    /// Returns nodes whose 0-based rank lies in `[start, stop)`.
    ///
    /// With `descending` the ranks count from the highest score.
    pub fn range_by_rank(&self, start: usize, stop: usize, descending: bool) -> Vec<IndexEntry> {
        let stop = stop.min(self.length);
        if start >= stop {
            return Vec::new();
        }

        let first = if descending {
            self.node_by_rank(self.length - start)
        } else {
            self.node_by_rank(start + 1)
        };
        self.walk(first, descending)
            .take(stop - start)
            .map(Node::entry)
            .collect()
    }

    // == Rank ==
    /// Returns the 1-based ascending rank of `(member, score)`.
    pub fn rank(&self, member: &str, score: i64) -> Option<usize> {
        let mut rank = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                let node = &self.nodes[next];
                if !(node.precedes(score, member) || node.matches(score, member)) {
                    break;
                }
                rank += self.span(x, i);
                x = next;
            }
            if x != HEAD && self.nodes[x].matches(score, member) {
                return Some(rank);
            }
        }
        None
    }

    // == First / Last ==
    /// Returns the node with the lowest score.
    pub fn first(&self) -> Option<IndexEntry> {
        self.forward(HEAD, 0).map(|idx| self.nodes[idx].entry())
    }

    /// Returns the node with the highest score.
    pub fn last(&self) -> Option<IndexEntry> {
        self.tail.map(|idx| self.nodes[idx].entry())
    }

    // == Iteration ==
    /// Iterates `(member, score)` pairs, ascending or descending.
    pub fn iter(&self, descending: bool) -> impl Iterator<Item = (&str, i64)> + '_ {
        let first = if descending {
            self.tail
        } else {
            self.forward(HEAD, 0)
        };
        self.walk(first, descending)
            .map(|node| (node.member.as_str(), node.score))
    }

    // == Internal Helpers ==
    fn forward(&self, x: usize, level: usize) -> Option<usize> {
        self.nodes[x].links[level].forward
    }

    fn span(&self, x: usize, level: usize) -> usize {
        self.nodes[x].links[level].span
    }

    fn walk(&self, first: Option<usize>, descending: bool) -> impl Iterator<Item = &Node> + '_ {
        std::iter::successors(first, move |&idx| {
            let node = &self.nodes[idx];
            if descending {
                node.backward
            } else {
                node.links[0].forward
            }
        })
        .map(move |idx| &self.nodes[idx])
    }

    fn node_by_rank(&self, rank: usize) -> Option<usize> {
        if rank == 0 || rank > self.length {
            return None;
        }
        let mut traversed = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if traversed + self.span(x, i) > rank {
                    break;
                }
                traversed += self.span(x, i);
                x = next;
            }
            if traversed == rank {
                return Some(x);
            }
        }
        None
    }

    fn has_in_score_range(&self, min: i64, max: i64) -> bool {
        if min > max {
            return false;
        }
        match (self.tail, self.forward(HEAD, 0)) {
            (Some(last), Some(first)) => {
                self.nodes[last].score >= min && self.nodes[first].score <= max
            }
            _ => false,
        }
    }

    fn first_in_score_range(&self, min: i64, max: i64) -> Option<usize> {
        if !self.has_in_score_range(min, max) {
            return None;
        }
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if self.nodes[next].score >= min {
                    break;
                }
                x = next;
            }
        }
        let first = self.forward(x, 0)?;
        (self.nodes[first].score <= max).then_some(first)
    }

    fn last_in_score_range(&self, min: i64, max: i64) -> Option<usize> {
        if !self.has_in_score_range(min, max) {
            return None;
        }
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if self.nodes[next].score > max {
                    break;
                }
                x = next;
            }
        }
        (x != HEAD && self.nodes[x].score >= min).then_some(x)
    }

    fn delete_node(&mut self, x: usize, update: &[usize; MAX_LEVEL]) -> IndexEntry {
        for (i, &prev) in update.iter().enumerate().take(self.level) {
            if self.forward(prev, i) == Some(x) {
                let removed = self.nodes[x].links[i];
                let link = &mut self.nodes[prev].links[i];
                link.span = link.span + removed.span - 1;
                link.forward = removed.forward;
            } else {
                self.nodes[prev].links[i].span -= 1;
            }
        }

        let backward = self.nodes[x].backward;
        match self.forward(x, 0) {
            Some(next) => self.nodes[next].backward = backward,
            None => self.tail = backward,
        }
        while self.level > 1 && self.forward(HEAD, self.level - 1).is_none() {
            self.level -= 1;
        }
        self.length -= 1;
        self.release(x)
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> IndexEntry {
        let node = &mut self.nodes[idx];
        let entry = IndexEntry {
            member: std::mem::take(&mut node.member),
            score: node.score,
            version: node.version,
        };
        node.links = Vec::new();
        node.backward = None;

        if self.length == 0 {
            // Drop the whole arena once the list drains
            self.nodes.truncate(1);
            self.free.clear();
        } else {
            self.free.push(idx);
        }
        entry
    }

    /// Walks every level and checks ordering, back links and spans.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let order: Vec<usize> = std::iter::successors(self.forward(HEAD, 0), |&idx| {
            self.forward(idx, 0)
        })
        .collect();
        assert_eq!(order.len(), self.length, "level-0 length mismatch");

        let mut rank_of = std::collections::HashMap::new();
        rank_of.insert(HEAD, 0usize);
        for (pos, &idx) in order.iter().enumerate() {
            rank_of.insert(idx, pos + 1);
            let expected_back = if pos == 0 { None } else { Some(order[pos - 1]) };
            assert_eq!(self.nodes[idx].backward, expected_back, "bad backward link");
            if pos > 0 {
                let prev = &self.nodes[order[pos - 1]];
                assert!(
                    prev.precedes(self.nodes[idx].score, &self.nodes[idx].member),
                    "nodes out of order"
                );
            }
        }
        assert_eq!(self.tail, order.last().copied(), "bad tail");

        for i in 0..self.level {
            let mut x = HEAD;
            while let Some(next) = self.forward(x, i) {
                assert_eq!(
                    self.span(x, i),
                    rank_of[&next] - rank_of[&x],
                    "bad span at level {i}"
                );
                x = next;
            }
        }
    }
}

/// Picks a level in `1..=MAX_LEVEL`, each promotion with fixed probability.
fn random_level() -> usize {
    let mut rng = rand::thread_rng();
    let mut level = 1;
    while level < MAX_LEVEL && rng.gen_bool(PROMOTION_PROBABILITY) {
        level += 1;
    }
    level
}
