use crate::budget::TokenBudget;
use crate::config::OverlapStrategy;
use crate::hierarchy::{Hierarchy, HierarchyNode};
use crate::levels::HierarchyLevel;
use crate::source::{SourceUnit, Span};
use crate::tokens::{SpanEstimates, TokenEstimator};
use crate::types::{Chunk, ChunkId, NodeRef, SourceRef, StructureSource};
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Packs hierarchy nodes into budget-bounded chunks.
///
/// Packing is greedy and depth-first. Each node is considered together with
/// the gap text before it (and, for the last child, the text after it), so
/// the pieces of a unit tile its text exactly. A piece that fits the open
/// chunk joins it; one that fits an empty chunk starts a new chunk; a larger
/// piece is descended into, and a leaf that still does not fit is split at
/// grapheme boundaries.
pub struct ChunkAssembler {
    budget: TokenBudget,
    overlap: OverlapStrategy,
    estimator: Arc<dyn TokenEstimator>,
}

impl ChunkAssembler {
    pub fn new(
        budget: TokenBudget,
        overlap: OverlapStrategy,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            budget,
            overlap,
            estimator,
        }
    }

    #[must_use]
    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    #[must_use]
    pub fn overlap(&self) -> OverlapStrategy {
        self.overlap
    }

    /// Chunks for a single unit, scoped by its path
    pub fn assemble(&self, unit: &SourceUnit, hierarchy: &Hierarchy) -> Vec<Chunk> {
        self.assemble_group(unit.path(), &[(unit, hierarchy)])
    }

    /// Chunks for several units packed together (directory grouping).
    ///
    /// Whole files are the packable units; a file is only descended into
    /// when it does not fit an empty chunk. Overlap never crosses files.
    pub fn assemble_group(&self, scope: &str, members: &[(&SourceUnit, &Hierarchy)]) -> Vec<Chunk> {
        let members: Vec<Member<'_>> = members
            .iter()
            .filter(|(unit, _)| !unit.text().is_empty())
            .map(|&(unit, hierarchy)| Member {
                unit,
                root: &hierarchy.root,
                structure: hierarchy.structure,
            })
            .collect();

        let indexes = members
            .iter()
            .map(|member| self.estimator.index(member.unit.text()))
            .collect();

        let mut packer = Packer {
            limit: self.budget.input_limit(),
            overlap_cap: self.overlap.cap_tokens(&self.budget),
            estimator: self.estimator.as_ref(),
            indexes,
            members: &members,
            scope,
            frames: Vec::new(),
            open: None,
            last_tail: None,
            chunks: Vec::new(),
        };

        for idx in 0..members.len() {
            packer.place(idx);
        }

        let chunks = packer.finish();
        log::debug!(
            "Assembled {} chunks for {scope} (input limit {})",
            chunks.len(),
            self.budget.input_limit()
        );
        chunks
    }
}

struct Member<'a> {
    unit: &'a SourceUnit,
    root: &'a HierarchyNode,
    structure: StructureSource,
}

/// A node reached while packing, linked to the node it was descended from
struct Frame<'a> {
    node: &'a HierarchyNode,
    parent: Option<usize>,
    depth: usize,
}

/// Node text plus its surrounding gap, attributed to one member
#[derive(Debug, Clone, Copy)]
struct Piece {
    member: usize,
    span: Span,
    frame: usize,
}

#[derive(Debug, Clone, Copy)]
struct Overlap {
    member: usize,
    span: Span,
    tokens: usize,
}

/// Last contiguous run of a chunk's body within one member
#[derive(Debug, Clone, Copy)]
struct Tail {
    member: usize,
    start: usize,
    end: usize,
}

struct OpenChunk {
    overlap: Option<Overlap>,
    pieces: Vec<Piece>,
    /// Upper bound on the estimate of the content built so far
    tokens: usize,
    forced: bool,
}

impl OpenChunk {
    fn new(overlap: Option<Overlap>, forced: bool) -> Self {
        Self {
            tokens: overlap.map_or(0, |o| o.tokens),
            overlap,
            pieces: Vec::new(),
            forced,
        }
    }

    fn tail(&self) -> Option<Tail> {
        let last = self.pieces.last()?;
        let mut start = last.span.start;
        for piece in self.pieces.iter().rev().skip(1) {
            if piece.member != last.member || piece.span.end != start {
                break;
            }
            start = piece.span.start;
        }
        Some(Tail {
            member: last.member,
            start,
            end: last.span.end,
        })
    }
}

struct Packer<'a> {
    limit: usize,
    overlap_cap: usize,
    estimator: &'a dyn TokenEstimator,
    /// Span estimates per member; estimates are subadditive, so summing
    /// piece estimates bounds the estimate of their concatenation
    indexes: Vec<Box<dyn SpanEstimates + 'a>>,
    members: &'a [Member<'a>],
    scope: &'a str,
    frames: Vec<Frame<'a>>,
    open: Option<OpenChunk>,
    last_tail: Option<Tail>,
    chunks: Vec<Chunk>,
}

impl<'a> Packer<'a> {
    fn text(&self, member: usize) -> &'a str {
        self.members[member].unit.text()
    }

    fn tokens(&self, member: usize, span: Span) -> usize {
        self.indexes[member].estimate_span(span)
    }

    fn enter(&mut self, node: &'a HierarchyNode, parent: Option<usize>) -> usize {
        let depth = parent.map_or(0, |idx| self.frames[idx].depth + 1);
        self.frames.push(Frame {
            node,
            parent,
            depth,
        });
        self.frames.len() - 1
    }

    /// Pack one member's hierarchy, descending through an explicit stack
    fn place(&mut self, member: usize) {
        let unit = self.members[member].unit;
        let root = self.enter(self.members[member].root, None);
        let mut pending = vec![(root, unit.full_span())];

        while let Some((frame, piece)) = pending.pop() {
            let node = self.frames[frame].node;
            let tokens = self.tokens(member, piece);

            if let Some(open) = &self.open {
                if open.tokens + tokens <= self.limit {
                    self.append(member, frame, piece, tokens);
                    continue;
                }
            }

            if tokens <= self.limit {
                self.flush();
                let room = self.overlap_cap.min(self.limit - tokens);
                let overlap = self.overlap_before(member, piece.start, room);
                self.open = Some(OpenChunk::new(overlap, false));
                self.append(member, frame, piece, tokens);
                continue;
            }

            if node.is_leaf() {
                self.flush();
                self.force_split(member, frame, piece);
                continue;
            }

            let mut cursor = piece.start;
            let last = node.children.len() - 1;
            let mut children = Vec::with_capacity(node.children.len());
            for (idx, child) in node.children.iter().enumerate() {
                let end = if idx == last { piece.end } else { child.span.end };
                children.push((self.enter(child, Some(frame)), Span::new(cursor, end)));
                cursor = end;
            }
            // Reversed so the first child is placed first
            pending.extend(children.into_iter().rev());
        }
    }

    fn append(&mut self, member: usize, frame: usize, span: Span, tokens: usize) {
        if let Some(open) = self.open.as_mut() {
            open.pieces.push(Piece {
                member,
                span,
                frame,
            });
            open.tokens += tokens;
        }
    }

    /// Cut an oversized leaf into consecutive fragments. Only the first
    /// fragment carries overlap; the last stays open for what follows.
    fn force_split(&mut self, member: usize, frame: usize, piece: Span) {
        log::debug!(
            "Forcing split of {} node in {} ({} bytes over a {} token limit)",
            self.frames[frame].node.kind,
            self.members[member].unit.path(),
            piece.len(),
            self.limit
        );

        let text = self.text(member);
        let bounds: Vec<usize> = text[piece.start..piece.end]
            .grapheme_indices(true)
            .map(|(idx, grapheme)| piece.start + idx + grapheme.len())
            .collect();

        let mut taken = 0;
        while taken < bounds.len() {
            let start = if taken == 0 { piece.start } else { bounds[taken - 1] };
            let overlap = if taken == 0 {
                self.overlap_before(member, start, self.overlap_cap)
            } else {
                None
            };
            let room = self
                .limit
                .saturating_sub(overlap.map_or(0, |o| o.tokens))
                .max(1);

            let count = self.fit_count(member, start, &bounds[taken..], room);
            let end = bounds[taken + count - 1];
            let tokens = self.tokens(member, Span::new(start, end));

            self.open = Some(OpenChunk::new(overlap, true));
            self.append(member, frame, Span::new(start, end), tokens);
            taken += count;
            if taken < bounds.len() {
                self.flush();
            }
        }
    }

    /// Number of graphemes (at least one) from `start` whose text fits `room`
    fn fit_count(&self, member: usize, start: usize, bounds: &[usize], room: usize) -> usize {
        let fits = |count: usize| self.tokens(member, Span::new(start, bounds[count - 1])) <= room;

        // Gallop to bracket the answer, then bisect
        let mut lo = 0;
        let mut hi = bounds.len() + 1;
        let mut step = 1;
        while lo + step <= bounds.len() {
            if fits(lo + step) {
                lo += step;
                step *= 2;
            } else {
                hi = lo + step;
                break;
            }
        }
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if fits(mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo.max(1)
    }

    /// Trailing slice of the previous chunk's body that ends at `at`, within
    /// `room` tokens. Whole lines are preferred; otherwise the longest
    /// grapheme-aligned suffix that fits.
    fn overlap_before(&self, member: usize, at: usize, room: usize) -> Option<Overlap> {
        if room == 0 {
            return None;
        }
        let tail = self.last_tail?;
        if tail.member != member || tail.end != at {
            return None;
        }

        let body = &self.text(member)[tail.start..tail.end];
        let tokens_from = |start: usize| self.tokens(member, Span::new(start, tail.end));

        let line_starts: Vec<usize> = body
            .match_indices('\n')
            .map(|(idx, _)| tail.start + idx + 1)
            .filter(|&start| start < tail.end)
            .collect();
        let idx = line_starts.partition_point(|&start| tokens_from(start) > room);

        let start = match line_starts.get(idx) {
            Some(&start) => start,
            None => {
                let graphemes: Vec<usize> = body
                    .grapheme_indices(true)
                    .map(|(idx, _)| tail.start + idx)
                    .filter(|&start| start > tail.start)
                    .collect();
                let idx = graphemes.partition_point(|&start| tokens_from(start) > room);
                *graphemes.get(idx)?
            }
        };

        Some(Overlap {
            member,
            span: Span::new(start, tail.end),
            tokens: tokens_from(start),
        })
    }

    /// Deepest frame enclosing both `a` and `b`
    fn common_ancestor(&self, mut a: usize, mut b: usize) -> usize {
        while a != b {
            let step = if self.frames[a].depth >= self.frames[b].depth {
                &mut a
            } else {
                &mut b
            };
            let Some(parent) = self.frames[*step].parent else {
                break;
            };
            *step = parent;
        }
        a
    }

    /// Kinds and lines from the member's root down to `frame`. The
    /// synthetic root is left out unless nothing else encloses the region.
    fn ancestry(&self, unit: &SourceUnit, frame: usize) -> Vec<NodeRef> {
        let mut chain = Vec::new();
        let mut current = Some(frame);
        while let Some(idx) = current {
            chain.push(self.frames[idx].node);
            current = self.frames[idx].parent;
        }
        if chain.len() > 1 {
            chain.pop();
        }

        chain
            .iter()
            .rev()
            .map(|node| {
                let (start_line, end_line) = unit.line_range(node.span);
                NodeRef {
                    kind: node.kind.clone(),
                    start_line,
                    end_line,
                }
            })
            .collect()
    }

    fn flush(&mut self) {
        let Some(open) = self.open.take() else {
            return;
        };
        if open.pieces.is_empty() {
            return;
        }
        self.last_tail = open.tail();
        let chunk = self.build(open);
        self.chunks.push(chunk);
    }

    fn build(&self, open: OpenChunk) -> Chunk {
        let mut content = String::new();

        let overlap_prefix_len = match open.overlap {
            Some(overlap) => {
                let text = self.members[overlap.member].unit.slice(overlap.span);
                content.push_str(text);
                text.chars().count()
            }
            None => 0,
        };

        // (member, span, deepest frame enclosing every piece of the run)
        let mut runs: Vec<(usize, Span, usize)> = Vec::new();
        for piece in &open.pieces {
            match runs.last_mut() {
                Some((member, span, frame))
                    if *member == piece.member && span.end == piece.span.start =>
                {
                    span.end = piece.span.end;
                    *frame = self.common_ancestor(*frame, piece.frame);
                }
                _ => runs.push((piece.member, piece.span, piece.frame)),
            }
        }

        let mut source_refs = Vec::with_capacity(runs.len());
        for &(member, span, frame) in &runs {
            let unit = self.members[member].unit;
            content.push_str(unit.slice(span));
            let (start_line, end_line) = unit.line_range(span);
            source_refs.push(SourceRef {
                path: unit.path().to_string(),
                span,
                start_line,
                end_line,
                ancestry: self.ancestry(unit, frame),
            });
        }

        let spans_members = open
            .pieces
            .iter()
            .any(|piece| piece.member != open.pieces[0].member);
        let level = if spans_members {
            HierarchyLevel::Directory
        } else {
            open.pieces
                .iter()
                .map(|piece| self.frames[piece.frame].node.level)
                .min()
                .unwrap_or(HierarchyLevel::Statement)
        };
        let structure = open
            .pieces
            .iter()
            .map(|piece| self.members[piece.member].structure)
            .max()
            .unwrap_or(StructureSource::Syntactic);

        Chunk {
            id: ChunkId::new(self.scope, self.chunks.len()),
            level,
            estimated_tokens: self.estimator.estimate(&content),
            content,
            source_refs,
            overlap_prefix_len,
            forced_split: open.forced,
            structure,
        }
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.chunks
    }
}
