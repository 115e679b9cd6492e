//! Context-path rule sets
//!
//! A [`RuleSet`] declares which context paths may be referenced from a given
//! place. Rules are attached to patterns such as `steps.*.outputs`, where `*`
//! matches any single segment and hands the matched text to the predicate.
//!
//! Validation walks the referenced paths as a tree, so a shared prefix is
//! checked once:
//! - the blanket rule (pattern `""`) runs first
//! - at each segment an exact rule is tried before a placeholder one, and
//!   the first candidate that passes (together with its subtree) wins
//! - segments without any rule are accepted
//! - the first failing predicate stops the walk

use std::fmt;

/// Predicate of a rule: receives the placeholder captures and the caller's context.
pub type Predicate<C> = Box<dyn Fn(&[&str], &mut C) -> bool>;

/// Placeholder segment in rule patterns.
pub const PLACEHOLDER: &str = "*";

#[derive(Clone, PartialEq, Eq)]
enum Segment {
    Name(String),
    Placeholder,
}

struct Node<C> {
    predicate: Option<Predicate<C>>,
    children: Vec<(Segment, Node<C>)>,
}

impl<C> Node<C> {
    fn new() -> Self {
        Self {
            predicate: None,
            children: Vec::new(),
        }
    }

    fn child_mut(&mut self, segment: Segment) -> &mut Node<C> {
        let position = self.children.iter().position(|(s, _)| *s == segment);
        let index = match position {
            Some(index) => index,
            None => {
                self.children.push((segment, Node::new()));
                self.children.len() - 1
            }
        };
        &mut self.children[index].1
    }

    fn candidates<'n>(&'n self, segment: &'n str) -> impl Iterator<Item = (bool, &'n Node<C>)> {
        let exact = self
            .children
            .iter()
            .filter(move |(s, _)| matches!(s, Segment::Name(name) if name == segment));
        let placeholder = self
            .children
            .iter()
            .filter(|(s, _)| *s == Segment::Placeholder);
        exact
            .map(|(_, node)| (false, node))
            .chain(placeholder.map(|(_, node)| (true, node)))
    }
}

/// Referenced paths merged by common prefix, in first-seen order.
#[derive(Default)]
struct RefTree<'a> {
    children: Vec<(&'a str, RefTree<'a>)>,
}

impl<'a> RefTree<'a> {
    fn insert(&mut self, path: &'a [String]) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        let position = self.children.iter().position(|(s, _)| *s == first);
        let index = match position {
            Some(index) => index,
            None => {
                self.children.push((first.as_str(), RefTree::default()));
                self.children.len() - 1
            }
        };
        self.children[index].1.insert(rest);
    }
}

/// Ordered collection of rules over context paths.
pub struct RuleSet<C> {
    root: Node<C>,
}

impl<C> Default for RuleSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for RuleSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn patterns<C>(node: &Node<C>, prefix: &str, out: &mut Vec<String>) {
            if node.predicate.is_some() {
                out.push(prefix.to_string());
            }
            for (segment, child) in &node.children {
                let name = match segment {
                    Segment::Name(name) => name.as_str(),
                    Segment::Placeholder => PLACEHOLDER,
                };
                let path = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}.{name}")
                };
                patterns(child, &path, out);
            }
        }
        let mut out = Vec::new();
        patterns(&self.root, "", &mut out);
        f.debug_struct("RuleSet").field("rules", &out).finish()
    }
}

impl<C> RuleSet<C> {
    pub fn new() -> Self {
        Self { root: Node::new() }
    }

    /// Attach a predicate to a dotted pattern. The empty pattern is the
    /// blanket rule. A later rule on the same pattern replaces the earlier one.
    pub fn rule(
        mut self,
        pattern: &str,
        predicate: impl Fn(&[&str], &mut C) -> bool + 'static,
    ) -> Self {
        let mut node = &mut self.root;
        for part in pattern.split('.').filter(|part| !part.is_empty()) {
            let segment = if part == PLACEHOLDER {
                Segment::Placeholder
            } else {
                Segment::Name(part.to_string())
            };
            node = node.child_mut(segment);
        }
        node.predicate = Some(Box::new(predicate));
        self
    }

    /// Validate a set of referenced context paths.
    ///
    /// With no references at all the blanket rule still runs, but its
    /// verdict does not matter: plain literals are always valid.
    pub fn validate(&self, refs: &[Vec<String>], context: &mut C) -> bool {
        let blanket = self
            .root
            .predicate
            .as_ref()
            .map_or(true, |predicate| predicate(&[], context));
        if refs.is_empty() {
            return true;
        }
        if !blanket {
            return false;
        }
        let mut tree = RefTree::default();
        for path in refs {
            tree.insert(path);
        }
        let mut captures = Vec::new();
        walk(&self.root, &tree, &mut captures, context)
    }
}

fn walk<'a, C>(
    node: &Node<C>,
    tree: &RefTree<'a>,
    captures: &mut Vec<&'a str>,
    context: &mut C,
) -> bool {
    tree.children.iter().all(|(segment, subtree)| {
        let mut candidates = node.candidates(segment).peekable();
        if candidates.peek().is_none() {
            return true;
        }
        candidates.any(|(placeholder, child)| {
            let depth = captures.len();
            if placeholder {
                captures.push(*segment);
            }
            let passed = child
                .predicate
                .as_ref()
                .map_or(true, |predicate| predicate(&captures[..], context))
                && walk(child, subtree, captures, context);
            captures.truncate(depth);
            passed
        })
    })
}
