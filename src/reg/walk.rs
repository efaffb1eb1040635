// Expanding key nodes into their subkeys.
//
// Subkey lists come in three shapes:
//
//   nk ── lf/lh ── nk, nk, ...
//   nk ── li ───── nk, nk, ...            (only below an ri, unless opted in)
//   nk ── ri ──┬── lf/lh ── nk, ...
//              └── li ───── nk, ...
//
// Nothing here recurses: pending keys and lists sit on an explicit stack, pushed in
// reverse so they pop in list order.
use std::collections::HashSet;

use tracing::{trace, warn};

use super::{
    cell::{KeyNode, SubkeyList},
    error::{RegError, Result},
    source::ByteSource,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Accept an li list referenced directly by a key node.
    pub accept_top_level_index: bool,

    /// Keys at this depth are reported but not expanded. The root is at depth 0.
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Key {
        offset: u32,
        depth: usize,
    },
    List {
        offset: u32,
        depth: usize,
        declared: i32,
        nested: bool,
    },
}

impl Pending {
    // the subkey list of `node`, or None for a leaf
    fn subkeys_of(node: &KeyNode, depth: usize) -> Option<Self> {
        if node.is_leaf() {
            return None;
        }
        Some(Pending::List {
            offset: node.subkeys,
            depth: depth + 1,
            declared: node.num_subkeys,
            nested: false,
        })
    }
}

/// Resolves subkeys through any [`ByteSource`].
#[derive(Debug)]
pub struct TreeWalker<S> {
    source: S,
    options: WalkOptions,
    warnings: Vec<RegError>,
}

impl<S: ByteSource> TreeWalker<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, WalkOptions::default())
    }

    pub fn with_options(source: S, options: WalkOptions) -> Self {
        Self {
            source,
            options,
            warnings: Vec::new(),
        }
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Recoverable problems met so far, oldest first.
    pub fn warnings(&self) -> &[RegError] {
        &self.warnings
    }

    /// Direct subkeys of `node`, read lazily in on-disk order.
    pub fn children(&mut self, node: &KeyNode) -> Children<'_, S> {
        Children {
            walker: self,
            stack: Pending::subkeys_of(node, 0).into_iter().collect(),
            failed: false,
        }
    }

    /// Depth-first pre-order traversal starting at (and including) `root`.
    pub fn walk(&mut self, root: KeyNode) -> Walk<'_, S> {
        let mut visited = HashSet::new();
        visited.insert(root.offset);

        Walk {
            walker: self,
            root: Some(root),
            stack: Vec::new(),
            visited,
            failed: false,
        }
    }

    /// Reads the whole tree below `root` into memory.
    pub fn tree(&mut self, root: KeyNode) -> Result<KeyTree> {
        let mut top = KeyTree::leaf(root.clone());

        // open[i] is the most recent key at depth i + 1 still collecting children
        let mut open: Vec<KeyTree> = Vec::new();
        for item in self.walk(root).skip(1) {
            let (depth, node) = item?;
            close(&mut open, &mut top, depth - 1);
            open.push(KeyTree::leaf(node));
        }
        close(&mut open, &mut top, 0);

        Ok(top)
    }

    // Replaces a pending list with what it points to.
    fn expand(
        &mut self,
        offset: u32,
        depth: usize,
        declared: i32,
        nested: bool,
        stack: &mut Vec<Pending>,
    ) -> Result<()> {
        let list = SubkeyList::read_at(&mut self.source, offset).map_err(|e| match e {
            RegError::UnknownSubkeyEncoding {
                offset, signature, ..
            } => RegError::UnknownSubkeyEncoding {
                offset,
                signature,
                nested,
            },
            e => e,
        })?;
        trace!(
            "expanding {} list at {offset:#x} with {} entries",
            list.kind().signature().escape_ascii(),
            list.len()
        );

        let keys: Vec<u32> = match list {
            SubkeyList::Hash { entries, .. } => entries.iter().map(|e| e.offset).collect(),
            SubkeyList::Index(offsets) if nested || self.options.accept_top_level_index => offsets,
            SubkeyList::Index(_) => {
                return Err(RegError::UnknownSubkeyEncoding {
                    offset,
                    signature: *b"li",
                    nested,
                });
            }
            SubkeyList::Indirect(_) if nested => {
                return Err(RegError::UnknownSubkeyEncoding {
                    offset,
                    signature: *b"ri",
                    nested,
                });
            }
            SubkeyList::Indirect(lists) => {
                stack.extend(lists.iter().rev().map(|&offset| Pending::List {
                    offset,
                    depth,
                    declared,
                    nested: true,
                }));
                return Ok(());
            }
        };

        // only a list hanging straight off the key is compared with its declared count
        if !nested && keys.len() as i64 != declared as i64 {
            let warning = RegError::SubkeyCountMismatch {
                offset,
                declared,
                actual: keys.len(),
            };
            warn!("{warning}");
            self.warnings.push(warning);
        }

        stack.extend(
            keys.iter()
                .rev()
                .map(|&offset| Pending::Key { offset, depth }),
        );
        Ok(())
    }
}

/// Lazy sequence of the direct subkeys of one key, see [`TreeWalker::children`].
pub struct Children<'w, S> {
    walker: &'w mut TreeWalker<S>,
    stack: Vec<Pending>,
    failed: bool,
}

impl<S: ByteSource> Iterator for Children<'_, S> {
    type Item = Result<KeyNode>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed {
            let step = match self.stack.pop()? {
                Pending::Key { offset, .. } => {
                    return Some(
                        KeyNode::read_at(&mut self.walker.source, offset)
                            .inspect_err(|_| self.failed = true),
                    );
                }
                Pending::List {
                    offset,
                    depth,
                    declared,
                    nested,
                } => self
                    .walker
                    .expand(offset, depth, declared, nested, &mut self.stack),
            };
            if let Err(e) = step {
                self.failed = true;
                return Some(Err(e));
            }
        }
        None
    }
}

/// Pre-order traversal yielding `(depth, key)`, see [`TreeWalker::walk`].
///
/// Every key offset may be yielded once. Reaching one again, through a loop or because
/// two lists name the same key, stops the walk with [`RegError::CycleDetected`].
pub struct Walk<'w, S> {
    walker: &'w mut TreeWalker<S>,
    root: Option<KeyNode>,
    stack: Vec<Pending>,
    visited: HashSet<u32>,
    failed: bool,
}

impl<S: ByteSource> Walk<'_, S> {
    fn step(&mut self) -> Option<Result<(usize, KeyNode)>> {
        if let Some(root) = self.root.take() {
            self.descend(&root, 0);
            return Some(Ok((0, root)));
        }

        loop {
            match self.stack.pop()? {
                Pending::Key { offset, depth } => {
                    if !self.visited.insert(offset) {
                        return Some(Err(RegError::CycleDetected { offset }));
                    }
                    let node = match KeyNode::read_at(&mut self.walker.source, offset) {
                        Ok(node) => node,
                        Err(e) => return Some(Err(e)),
                    };
                    self.descend(&node, depth);
                    return Some(Ok((depth, node)));
                }
                Pending::List {
                    offset,
                    depth,
                    declared,
                    nested,
                } => {
                    if let Err(e) =
                        self.walker
                            .expand(offset, depth, declared, nested, &mut self.stack)
                    {
                        return Some(Err(e));
                    }
                }
            }
        }
    }

    fn descend(&mut self, node: &KeyNode, depth: usize) {
        if self.walker.options.max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        self.stack.extend(Pending::subkeys_of(node, depth));
    }
}

impl<S: ByteSource> Iterator for Walk<'_, S> {
    type Item = Result<(usize, KeyNode)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.step()?;
        self.failed = item.is_err();
        Some(item)
    }
}

/// An owned key with all of its descendants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTree {
    pub node: KeyNode,
    pub children: Vec<KeyTree>,
}

impl KeyTree {
    pub fn leaf(node: KeyNode) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Pre-order iterator over `(depth, key)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &KeyNode)> {
        let mut stack = vec![(0, self)];
        std::iter::from_fn(move || {
            let (depth, tree) = stack.pop()?;
            stack.extend(tree.children.iter().rev().map(|c| (depth + 1, c)));
            Some((depth, &tree.node))
        })
    }

    /// Number of keys in the tree, this one included.
    pub fn key_count(&self) -> usize {
        self.iter().count()
    }

    /// Follows a backslash-separated path of subkey names, compared ASCII case-insensitively.
    pub fn find(&self, path: &str) -> Option<&KeyTree> {
        path.split('\\')
            .filter(|part| !part.is_empty())
            .try_fold(self, |tree, part| {
                tree.children
                    .iter()
                    .find(|c| c.node.name.eq_ignore_ascii_case(part))
            })
    }
}

// Attach finished subtrees to their parents until only `keep` remain open.
fn close(open: &mut Vec<KeyTree>, top: &mut KeyTree, keep: usize) {
    while open.len() > keep {
        let Some(done) = open.pop() else { break };
        match open.last_mut() {
            Some(parent) => parent.children.push(done),
            None => top.children.push(done),
        }
    }
}
