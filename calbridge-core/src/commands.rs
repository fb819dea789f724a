// ABOUTME: Slash command tokenizing and longest-prefix routing over a trie of command paths
// ABOUTME: Unmatched input falls through to a default handler with every token as arguments

use std::collections::HashMap;

/// Split a slash command into tokens after the trigger.
///
/// # Arguments
/// * `text` - Raw command text, e.g. `/cronofy view`
/// * `trigger` - Command trigger without the slash, e.g. `cronofy`
///
/// # Returns
/// * `Some(tokens)` - Tokens following the trigger (possibly empty)
/// * `None` - Empty input, or the first token is not `/<trigger>`
pub fn parse_slash_command(text: &str, trigger: &str) -> Option<Vec<String>> {
    let mut tokens = text.split_whitespace();
    let first = tokens.next()?;
    if first.strip_prefix('/') != Some(trigger) {
        return None;
    }
    Some(tokens.map(str::to_string).collect())
}

struct Node<H> {
    handler: Option<H>,
    children: HashMap<String, Node<H>>,
}

impl<H> Node<H> {
    fn new() -> Self {
        Self {
            handler: None,
            children: HashMap::new(),
        }
    }
}

/// A matched route: the handler plus the tokens left over as its arguments
#[derive(Debug, PartialEq, Eq)]
pub struct Route<'a, H, S> {
    pub handler: &'a H,
    pub args: &'a [S],
    /// Number of leading tokens consumed by the command path
    pub depth: usize,
}

/// Trie-based command dispatcher.
///
/// A command path is a sequence of words (`["view"]`, `["calendar", "list"]`).
/// Routing walks the trie token by token and keeps the deepest node that has a
/// handler, so longer registered paths win over their prefixes.
pub struct CommandRouter<H> {
    root: Node<H>,
    default: H,
}

impl<H> CommandRouter<H> {
    pub fn new(default: H) -> Self {
        Self {
            root: Node::new(),
            default,
        }
    }

    /// Register `handler` at `path`. An empty path replaces the default handler.
    pub fn register(&mut self, path: &[&str], handler: H) -> &mut Self {
        if path.is_empty() {
            self.default = handler;
            return self;
        }
        let mut node = &mut self.root;
        for word in path {
            node = node.children.entry((*word).to_string()).or_insert_with(Node::new);
        }
        node.handler = Some(handler);
        self
    }

    pub fn route<'a, S: AsRef<str>>(&'a self, tokens: &'a [S]) -> Route<'a, H, S> {
        let mut best: Option<(&H, usize)> = None;
        let mut node = &self.root;

        for (i, token) in tokens.iter().enumerate() {
            match node.children.get(token.as_ref()) {
                Some(child) => {
                    node = child;
                    if let Some(handler) = &node.handler {
                        best = Some((handler, i + 1));
                    }
                }
                None => break,
            }
        }

        match best {
            Some((handler, depth)) => Route {
                handler,
                args: &tokens[depth..],
                depth,
            },
            None => Route {
                handler: &self.default,
                args: tokens,
                depth: 0,
            },
        }
    }
}
