//! Garbage Collector
//!
//! Tri-color mark-and-sweep over the node pool, with an explicit
//! worklist so marking deep arrays never recurses on the host stack.
//!
//! Order of operations:
//!
//! 1. Reify every variadic feed. A va-style feed cannot be rewound and
//!    reification allocates, so it must happen before any mark bit is
//!    set.
//! 2. Mark the roots: ROOT-flagged nodes (API handles), the data stack,
//!    every level (feed, output, spare), every call frame (action value
//!    and varlist), both guard stacks, the manuals list (unmanaged nodes
//!    keep their managed children alive), and the lib/user contexts.
//!    The canon symbol table holds ids, not nodes, so it needs no
//!    marking.
//! 3. Drain the worklist: array cells, payload node references, bindings,
//!    and LINK/MISC slots flagged as needing a mark.
//! 4. Sweep: free managed+unmarked nodes, clear marks on survivors,
//!    leave unmanaged nodes for their owners.
//!
//! A collection request raised by the ballast or by [`Interp::request_recycle`]
//! is honored at the next step boundary; `gc_disable` defers it.

use crate::interp::Interp;
use sigil_core::{Cell, NodeId, Node, SeriesData, SeriesFlags};
use tracing::debug;

impl Interp {
    /// Defer collections until the matching [`Interp::gc_enable`].
    pub fn gc_disable(&mut self) {
        self.gc_disabled += 1;
    }

    pub fn gc_enable(&mut self) {
        debug_assert!(self.gc_disabled > 0, "gc_enable without gc_disable");
        self.gc_disabled = self.gc_disabled.saturating_sub(1);
    }

    /// Run a full collection cycle; returns the number of nodes freed.
    pub fn recycle(&mut self) -> usize {
        if self.gc_disabled > 0 {
            self.request_recycle();
            return 0;
        }

        // Phase 1: reify variadic feeds while allocation is still legal.
        for li in 0..self.levels.len() {
            self.feed_reify(li);
        }

        // Phase 2: roots.
        let mut worklist: Vec<NodeId> = Vec::new();

        let stack_cells: Vec<Cell> = self.ds.live().to_vec();
        for cell in &stack_cells {
            self.mark_cell(cell, &mut worklist);
        }

        for li in 0..self.levels.len() {
            let (current, gotten, lookback, out, spare, specifier, source_node) = {
                let level = &self.levels[li];
                let source_node = match level.feed.source {
                    crate::feed::FeedSource::Array { node, .. } => Some(node),
                    crate::feed::FeedSource::Variadic { .. } => None,
                };
                (
                    level.feed.current,
                    level.feed.gotten,
                    level.feed.lookback,
                    level.out,
                    level.spare,
                    level.feed.specifier,
                    source_node,
                )
            };
            self.mark_cell(&current, &mut worklist);
            if let Some(g) = gotten {
                self.mark_cell(&g, &mut worklist);
            }
            self.mark_cell(&lookback, &mut worklist);
            self.mark_cell(&out, &mut worklist);
            self.mark_cell(&spare, &mut worklist);
            if let Some(spec) = specifier {
                self.mark_node(spec, &mut worklist);
            }
            if let Some(node) = source_node {
                self.mark_node(node, &mut worklist);
            }
        }

        for ci in 0..self.calls.len() {
            let (original, varlist) = {
                let call = &self.calls[ci];
                (call.original, call.varlist)
            };
            self.mark_cell(&original, &mut worklist);
            self.mark_node(varlist, &mut worklist);
        }

        let guarded_nodes: Vec<NodeId> = self.heap.guarded_nodes().to_vec();
        for node in guarded_nodes {
            self.mark_node(node, &mut worklist);
        }
        let guarded_cells: Vec<Cell> = self.heap.guarded_cells().to_vec();
        for cell in &guarded_cells {
            self.mark_cell(cell, &mut worklist);
        }

        // Unmanaged nodes are not collection candidates, but their
        // contents may reference managed nodes that must survive.
        let manuals: Vec<NodeId> = self.heap.manuals().to_vec();
        for node in manuals {
            self.mark_node(node, &mut worklist);
        }

        let rooted: Vec<NodeId> = self
            .heap
            .live_nodes()
            .filter(|&id| self.heap.has_flag(id, SeriesFlags::ROOT))
            .collect();
        for node in rooted {
            self.mark_node(node, &mut worklist);
        }

        let lib = self.lib;
        let user = self.user;
        self.mark_node(lib, &mut worklist);
        self.mark_node(user, &mut worklist);

        if let Some(thrown) = self.thrown.clone() {
            self.mark_cell(&thrown.label, &mut worklist);
            self.mark_cell(&thrown.payload, &mut worklist);
        }

        // Sentinel actions stay callable for label comparisons.
        let sentinels = [
            self.sentinels.return_,
            self.sentinels.break_,
            self.sentinels.continue_,
            self.sentinels.quit,
            self.sentinels.throw,
            self.sentinels.parse_accept,
            self.sentinels.parse_reject,
        ];
        for sentinel in sentinels.into_iter().flatten() {
            self.mark_cell(&sentinel, &mut worklist);
        }

        // Phase 3: drain.
        while let Some(id) = worklist.pop() {
            self.mark_children(id, &mut worklist);
        }

        // Phase 4: sweep.
        let freed = self.heap.sweep();
        self.heap.reset_ballast();
        self.signals.remove(crate::interp::Signals::RECYCLE);
        self.gc_cycles += 1;
        debug!(
            freed,
            live = self.heap.node_count(),
            cycle = self.gc_cycles,
            "recycle complete"
        );
        freed
    }

    /// Mark a node, queueing it for child traversal on first visit.
    fn mark_node(&mut self, id: NodeId, worklist: &mut Vec<NodeId>) {
        if self.heap.is_free(id) {
            return;
        }
        if self.heap.mark(id) {
            worklist.push(id);
        }
    }

    /// Mark everything a cell references: payload nodes and the binding.
    fn mark_cell(&mut self, cell: &Cell, worklist: &mut Vec<NodeId>) {
        let (first, second) = cell.payload_nodes();
        if let Some(node) = first {
            self.mark_node(node, worklist);
        }
        if let Some(node) = second {
            self.mark_node(node, worklist);
        }
        if let Some(binding) = cell.binding() {
            if !self.heap.is_free(binding) {
                self.mark_node(binding, worklist);
            }
        }
    }

    fn mark_children(&mut self, id: NodeId, worklist: &mut Vec<NodeId>) {
        match self.heap.node(id) {
            Node::Free { .. } => {}
            Node::Pairing { cells, .. } => {
                let pair = *cells;
                self.mark_cell(&pair[0], worklist);
                self.mark_cell(&pair[1], worklist);
            }
            Node::Series(series) => {
                let flags = series.flags;
                let link = series.link;
                let misc = series.misc;
                let cell_count = match series.data() {
                    SeriesData::Array { cells } => cells.len(),
                    _ => 0,
                };
                if flags.contains(SeriesFlags::LINK_MARK) {
                    if let Some(node) = link {
                        self.mark_node(node, worklist);
                    }
                }
                if flags.contains(SeriesFlags::MISC_MARK) {
                    if let Some(node) = misc {
                        self.mark_node(node, worklist);
                    }
                }
                for i in 0..cell_count {
                    let cell = self.heap.cell_at(id, i);
                    self.mark_cell(&cell, worklist);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::InterpConfig;
    use crate::interp::Interp;

    fn interp() -> Interp {
        Interp::new(InterpConfig::default())
    }

    #[test]
    fn test_two_immediate_recycles_second_frees_nothing() {
        let mut i = interp();
        // Make some short-lived structure.
        i.do_source("loop 10 [x: [1 2 3] y: \"text\"]").unwrap();
        i.recycle();
        let second = i.recycle();
        assert_eq!(second, 0, "a second immediate recycle must free nothing");
    }

    #[test]
    fn test_reachable_values_survive() {
        let mut i = interp();
        i.do_source("keep: [a b [c d] \"str\"]").unwrap();
        i.recycle();
        let kept = i.user_get("keep").unwrap();
        assert_eq!(i.mold_value(&kept), "[a b [c d] \"str\"]");
    }

    #[test]
    fn test_garbage_is_freed() {
        let mut i = interp();
        i.do_source("loop 50 [elide mold [1 2 3 4 5]]").unwrap();
        let freed = i.recycle();
        assert!(freed > 0, "unreachable scan/mold results should be freed");
    }

    #[test]
    fn test_disabled_gc_defers() {
        let mut i = interp();
        i.do_source("loop 10 [elide mold [1 2 3]]").unwrap();
        i.gc_disable();
        assert_eq!(i.recycle(), 0);
        i.gc_enable();
        assert!(i.recycle() > 0);
    }
}
