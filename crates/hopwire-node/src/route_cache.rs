use std::collections::HashMap;
use std::sync::Mutex;

use hopwire_core::{NodeId, Route};

/// Destination-indexed route cache, holding two coexisting views of the
/// same underlying routes: a fast-path next-hop map, used when forwarding
/// data without inspecting the full path, and a full source-route map,
/// used to originate traffic and to build replies.
#[derive(Default)]
pub struct RouteCache {
    inner: Mutex<RouteCacheInner>,
}

#[derive(Default)]
struct RouteCacheInner {
    next_hop: HashMap<NodeId, NodeId>,
    routes: HashMap<NodeId, Route>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or overwrites) both views for `dest` from a known route.
    /// The route's element after `self_id` becomes the cached next hop.
    pub fn add_or_update(&self, self_id: NodeId, dest: NodeId, route: Route) {
        let next_hop = hopwire_core::next_hop_after(&route, self_id);
        let mut inner = self.inner.lock().expect("route cache lock poisoned");
        if let Some(next_hop) = next_hop {
            inner.next_hop.insert(dest, next_hop);
        }
        inner.routes.insert(dest, route);
    }

    pub fn get_next_hop(&self, dest: NodeId) -> Option<NodeId> {
        self.inner
            .lock()
            .expect("route cache lock poisoned")
            .next_hop
            .get(&dest)
            .copied()
    }

    pub fn get_route(&self, dest: NodeId) -> Option<Route> {
        self.inner
            .lock()
            .expect("route cache lock poisoned")
            .routes
            .get(&dest)
            .cloned()
    }

    pub fn remove(&self, dest: NodeId) {
        let mut inner = self.inner.lock().expect("route cache lock poisoned");
        inner.next_hop.remove(&dest);
        inner.routes.remove(&dest);
    }

    /// Removes every cached entry whose next hop, or whose route, passes
    /// through the now-failed node `h`.
    pub fn remove_routes_with_next_hop(&self, h: NodeId) {
        let mut inner = self.inner.lock().expect("route cache lock poisoned");
        inner.next_hop.retain(|_, next_hop| *next_hop != h);
        inner.routes.retain(|_, route| !route.contains(&h));
    }

    pub fn size(&self) -> usize {
        self.inner.lock().expect("route cache lock poisoned").routes.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("route cache lock poisoned");
        inner.next_hop.clear();
        inner.routes.clear();
    }

    /// Renders a stable text dump, one `dest -> route` line per entry,
    /// suitable for the on-disk `RouteCache.txt`/`DSR_RouteCache.txt` artifacts.
    pub fn render_text(&self) -> String {
        let inner = self.inner.lock().expect("route cache lock poisoned");
        let mut dests: Vec<&NodeId> = inner.routes.keys().collect();
        dests.sort();
        let mut out = String::new();
        for dest in dests {
            let route = &inner.routes[dest];
            let path = route
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join("->");
            out.push_str(&format!("{dest} -> {path}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_or_update_populates_both_views() {
        let cache = RouteCache::new();
        cache.add_or_update(0, 4, vec![0, 1, 2, 3, 4]);
        assert_eq!(cache.get_next_hop(4), Some(1));
        assert_eq!(cache.get_route(4), Some(vec![0, 1, 2, 3, 4]));
    }

    #[test]
    fn remove_routes_with_next_hop_clears_both_views() {
        let cache = RouteCache::new();
        cache.add_or_update(0, 4, vec![0, 1, 2, 3, 4]);
        cache.add_or_update(0, 9, vec![0, 5, 9]);

        cache.remove_routes_with_next_hop(1);

        assert_eq!(cache.get_next_hop(4), None);
        assert_eq!(cache.get_route(4), None);
        // entry not going through node 1 survives
        assert_eq!(cache.get_next_hop(9), Some(5));
    }

    #[test]
    fn remove_routes_with_next_hop_catches_mid_route_failures_too() {
        // node 2 is not anyone's immediate next hop from node 0's perspective here,
        // but it is present later in the route and must still be purged.
        let cache = RouteCache::new();
        cache.add_or_update(5, 4, vec![5, 1, 2, 3, 4]);
        cache.remove_routes_with_next_hop(2);
        assert_eq!(cache.get_route(4), None);
    }

    #[test]
    fn size_and_clear() {
        let cache = RouteCache::new();
        cache.add_or_update(0, 4, vec![0, 1, 4]);
        assert_eq!(cache.size(), 1);
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn render_text_is_sorted_by_destination() {
        let cache = RouteCache::new();
        cache.add_or_update(0, 9, vec![0, 9]);
        cache.add_or_update(0, 4, vec![0, 4]);
        let text = cache.render_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "4 -> 0->4");
        assert_eq!(lines[1], "9 -> 0->9");
    }
}
