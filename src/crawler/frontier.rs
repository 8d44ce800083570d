//! Crawl frontier: visited-set gating and the depth-ordered queue
//!
//! The frontier owns the only mutable crawl state: the set of normalized
//! URLs ever claimed and the queue of pages awaiting fetch. Claiming
//! happens on enqueue, before any fetch is issued, so the same URL can
//! never be handed out twice even when many pages link to it. The
//! frontier is owned exclusively by the coordinator; worker tasks report
//! discovered links back instead of touching it concurrently.

use std::collections::{HashSet, VecDeque};
use url::Url;

/// A page queued for fetching
///
/// Created when a link is accepted by the scope rules; immutable after
/// creation.
#[derive(Debug, Clone)]
pub struct CrawlTask {
    /// The page URL (normalized form)
    pub url: Url,

    /// Crawl depth (seeds are depth 0)
    pub depth: u32,

    /// Host of the seed this task descends from
    pub origin_host: String,
}

/// Breadth-first crawl frontier
#[derive(Debug, Default)]
pub struct Frontier {
    /// Normalized URLs already claimed (pages and file candidates alike);
    /// membership is permanent for the run
    visited: HashSet<String>,

    /// Pages awaiting fetch, in non-decreasing depth order
    queue: VecDeque<CrawlTask>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a normalized URL
    ///
    /// Returns true exactly once per URL; later claims return false.
    /// Both page tasks and file candidates go through this gate, which is
    /// what makes discovery idempotent.
    pub fn claim(&mut self, normalized_url: &str) -> bool {
        self.visited.insert(normalized_url.to_string())
    }

    /// Returns whether a normalized URL has been claimed
    pub fn is_visited(&self, normalized_url: &str) -> bool {
        self.visited.contains(normalized_url)
    }

    /// Enqueues a page task if its URL has not been claimed yet
    ///
    /// Returns true when the task was accepted. Tasks must be enqueued in
    /// non-decreasing depth order (the coordinator's level-by-level
    /// expansion guarantees this).
    pub fn try_enqueue(&mut self, task: CrawlTask) -> bool {
        if !self.claim(task.url.as_str()) {
            return false;
        }
        self.queue.push_back(task);
        true
    }

    /// Removes and returns every task at the current shallowest depth
    ///
    /// Returns None when the queue is empty. This is the unit of
    /// breadth-first expansion: pages within a level fetch concurrently,
    /// levels run in order.
    pub fn pop_level(&mut self) -> Option<(u32, Vec<CrawlTask>)> {
        let depth = self.queue.front()?.depth;
        let mut level = Vec::new();

        while let Some(task) = self.queue.front() {
            if task.depth != depth {
                break;
            }
            // front() just matched, pop cannot fail
            if let Some(task) = self.queue.pop_front() {
                level.push(task);
            }
        }

        Some((depth, level))
    }

    /// Number of pages awaiting fetch
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Whether any pages await fetch
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of URLs ever claimed
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(url: &str, depth: u32) -> CrawlTask {
        CrawlTask {
            url: Url::parse(url).unwrap(),
            depth,
            origin_host: "example.com".to_string(),
        }
    }

    #[test]
    fn test_claim_is_once_only() {
        let mut frontier = Frontier::new();
        assert!(frontier.claim("https://example.com/a"));
        assert!(!frontier.claim("https://example.com/a"));
        assert_eq!(frontier.visited_count(), 1);
    }

    #[test]
    fn test_enqueue_gates_on_visited() {
        let mut frontier = Frontier::new();
        assert!(frontier.try_enqueue(task("https://example.com/a", 0)));
        assert!(!frontier.try_enqueue(task("https://example.com/a", 1)));
        assert_eq!(frontier.queue_len(), 1);
    }

    #[test]
    fn test_claimed_file_url_cannot_become_page() {
        let mut frontier = Frontier::new();
        // A file candidate claims the URL first
        assert!(frontier.claim("https://example.com/report.pdf"));
        // The same URL can no longer be enqueued as a page
        assert!(!frontier.try_enqueue(task("https://example.com/report.pdf", 1)));
    }

    #[test]
    fn test_pop_level_returns_single_depth() {
        let mut frontier = Frontier::new();
        frontier.try_enqueue(task("https://example.com/a", 0));
        frontier.try_enqueue(task("https://example.com/b", 0));
        frontier.try_enqueue(task("https://example.com/c", 1));

        let (depth, level) = frontier.pop_level().unwrap();
        assert_eq!(depth, 0);
        assert_eq!(level.len(), 2);

        let (depth, level) = frontier.pop_level().unwrap();
        assert_eq!(depth, 1);
        assert_eq!(level.len(), 1);

        assert!(frontier.pop_level().is_none());
    }

    #[test]
    fn test_empty_frontier() {
        let mut frontier = Frontier::new();
        assert!(frontier.is_empty());
        assert!(frontier.pop_level().is_none());
    }
}
