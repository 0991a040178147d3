//! Index trees: the item outline of an expansion.
//!
//! An [`IndexBuilder`] turns expansion text into an [`IndexTree`]. Trees are
//! stored in the index cache as [`IndexEntry`] values whose names are ids in
//! the shared [`NameTable`], so every stored tree is only meaningful next to
//! the name table it was written with.

use expanse_common::Ident;
use expanse_expand::decl::token::{parse_token_trees, Delimiter, TokenKind, TokenTree};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::names::NameTable;

/// Version of the index tree layout and of [`ItemIndexBuilder`]'s output.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// The kind of an indexed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// `fn`
    Function,
    /// `struct`
    Struct,
    /// `enum`
    Enum,
    /// `union`
    Union,
    /// `trait`
    Trait,
    /// `impl`, named after its self type.
    Impl,
    /// `mod`
    Module,
    /// `const`
    Const,
    /// `static`
    Static,
    /// `type`
    TypeAlias,
    /// `macro_rules!`
    Macro,
}

/// One item and the items nested inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNode {
    /// What the item is.
    pub kind: ItemKind,
    /// Its name.
    pub name: String,
    /// Byte offset of the item keyword in the expansion text.
    pub offset: u32,
    /// Items declared in its body (module, trait, and impl members).
    pub children: Vec<IndexNode>,
}

/// The items of an expansion, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTree {
    /// Top-level items.
    pub items: Vec<IndexNode>,
}

impl IndexTree {
    /// Finds the first item called `name`, searching depth-first.
    pub fn find(&self, name: &str) -> Option<&IndexNode> {
        fn walk<'a>(nodes: &'a [IndexNode], name: &str) -> Option<&'a IndexNode> {
            nodes
                .iter()
                .find_map(|n| (n.name == name).then_some(n).or_else(|| walk(&n.children, name)))
        }
        walk(&self.items, name)
    }

    /// Total number of items at every depth.
    pub fn len(&self) -> usize {
        fn count(nodes: &[IndexNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.items)
    }

    /// Returns `true` if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Produces an index tree from expansion text.
pub trait IndexBuilder: Send + Sync {
    /// Builds the tree, or returns `None` if no tree should exist for this
    /// text. `None` is a decision, not a failure, and is cached as such.
    fn build_index(&self, text: &str) -> Option<IndexTree>;
}

/// The default builder: an outline of the items in the text.
///
/// Produces no tree for text that does not tokenize or holds no tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemIndexBuilder;

impl IndexBuilder for ItemIndexBuilder {
    fn build_index(&self, text: &str) -> Option<IndexTree> {
        let trees = parse_token_trees(text).ok()?;
        if trees.is_empty() {
            return None;
        }
        Some(IndexTree {
            items: scan_items(&trees),
        })
    }
}

fn item_keyword(tree: &TokenTree) -> Option<ItemKind> {
    let token = tree.as_leaf()?;
    if token.kind != TokenKind::Ident {
        return None;
    }
    Some(match token.text.as_str() {
        "fn" => ItemKind::Function,
        "struct" => ItemKind::Struct,
        "enum" => ItemKind::Enum,
        "union" => ItemKind::Union,
        "trait" => ItemKind::Trait,
        "impl" => ItemKind::Impl,
        "mod" => ItemKind::Module,
        "const" => ItemKind::Const,
        "static" => ItemKind::Static,
        "type" => ItemKind::TypeAlias,
        "macro_rules" => ItemKind::Macro,
        _ => return None,
    })
}

fn ident_at(trees: &[TokenTree], i: usize) -> Option<&str> {
    let token = trees.get(i)?.as_leaf()?;
    (token.kind == TokenKind::Ident).then(|| token.text.trim_start_matches("r#"))
}

/// Index of the first `{ }` group at or after `from`, stopping at `;`.
fn body_group(trees: &[TokenTree], from: usize) -> Option<usize> {
    for (i, tree) in trees.iter().enumerate().skip(from) {
        match tree {
            TokenTree::Group(g) if g.delimiter == Delimiter::Brace => return Some(i),
            t if t.is_punct(';') => return None,
            _ => {}
        }
    }
    None
}

/// The self type of an `impl` header: the last identifier outside generic
/// arguments, i.e. the final path segment after `for` if there is one.
fn impl_name(trees: &[TokenTree], start: usize, end: usize) -> Option<String> {
    let mut depth = 0usize;
    let mut candidate = None;
    for tree in &trees[start..end] {
        if tree.is_punct('<') {
            depth += 1;
        } else if tree.is_punct('>') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 {
            if tree.is_ident("where") {
                break;
            }
            if let Some(token) = tree.as_leaf() {
                if token.kind == TokenKind::Ident
                    && !matches!(token.text.as_str(), "for" | "unsafe" | "dyn" | "mut" | "const")
                {
                    candidate = Some(token.text.clone());
                }
            }
        }
    }
    candidate
}

fn scan_items(trees: &[TokenTree]) -> Vec<IndexNode> {
    let mut items = Vec::new();
    let mut i = 0;
    while i < trees.len() {
        let Some(kind) = item_keyword(&trees[i]) else {
            i += 1;
            continue;
        };
        let offset = u32::try_from(trees[i].range().start).unwrap_or(u32::MAX);

        let (name, next) = match kind {
            // `const fn` is a function.
            ItemKind::Const if trees.get(i + 1).is_some_and(|t| t.is_ident("fn")) => {
                i += 1;
                continue;
            }
            ItemKind::Macro if trees.get(i + 1).is_some_and(|t| t.is_punct('!')) => {
                match ident_at(trees, i + 2) {
                    Some(name) => (name.to_string(), i + 3),
                    None => {
                        i += 1;
                        continue;
                    }
                }
            }
            ItemKind::Macro => {
                i += 1;
                continue;
            }
            ItemKind::Impl => {
                let end = body_group(trees, i + 1).unwrap_or(trees.len());
                match impl_name(trees, i + 1, end) {
                    Some(name) => (name, i + 1),
                    None => {
                        i += 1;
                        continue;
                    }
                }
            }
            ItemKind::Static if trees.get(i + 1).is_some_and(|t| t.is_ident("mut")) => {
                match ident_at(trees, i + 2) {
                    Some(name) => (name.to_string(), i + 3),
                    None => {
                        i += 1;
                        continue;
                    }
                }
            }
            _ => match ident_at(trees, i + 1) {
                Some(name) => (name.to_string(), i + 2),
                // `fn(u8)` types, `union` used as a plain identifier, ...
                None => {
                    i += 1;
                    continue;
                }
            },
        };

        let mut children = Vec::new();
        let mut resume = next;
        if matches!(kind, ItemKind::Module | ItemKind::Trait | ItemKind::Impl) {
            if let Some(body) = body_group(trees, next) {
                if let TokenTree::Group(group) = &trees[body] {
                    children = scan_items(&group.children);
                }
                resume = body + 1;
            }
        }

        items.push(IndexNode {
            kind,
            name,
            offset,
            children,
        });
        i = resume;
    }
    items
}

/// An index node as stored on disk, with its name replaced by an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIndexNode {
    kind: ItemKind,
    name: Ident,
    offset: u32,
    children: Vec<StoredIndexNode>,
}

/// The value stored in the index cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexEntry {
    /// A tree.
    Tree(Vec<StoredIndexNode>),
    /// The builder decided that no tree exists for the text.
    NoArtifact,
}

impl IndexEntry {
    /// Converts a builder result into a storable entry, interning its names.
    pub fn encode(tree: Option<&IndexTree>, names: &NameTable) -> IndexEntry {
        fn encode_nodes(nodes: &[IndexNode], names: &NameTable) -> Vec<StoredIndexNode> {
            nodes
                .iter()
                .map(|n| StoredIndexNode {
                    kind: n.kind,
                    name: names.intern(&n.name),
                    offset: n.offset,
                    children: encode_nodes(&n.children, names),
                })
                .collect()
        }
        match tree {
            Some(tree) => IndexEntry::Tree(encode_nodes(&tree.items, names)),
            None => IndexEntry::NoArtifact,
        }
    }

    /// Converts a stored entry back into a builder result.
    ///
    /// Fails if the entry names an id that `names` does not hold.
    pub fn decode(&self, names: &NameTable) -> Result<Option<IndexTree>, CacheError> {
        fn decode_nodes(
            nodes: &[StoredIndexNode],
            names: &NameTable,
        ) -> Result<Vec<IndexNode>, CacheError> {
            nodes
                .iter()
                .map(|n| {
                    let name = names.resolve(n.name).ok_or(CacheError::UnknownName {
                        id: n.name.as_raw(),
                    })?;
                    Ok(IndexNode {
                        kind: n.kind,
                        name,
                        offset: n.offset,
                        children: decode_nodes(&n.children, names)?,
                    })
                })
                .collect()
        }
        match self {
            IndexEntry::Tree(nodes) => Ok(Some(IndexTree {
                items: decode_nodes(nodes, names)?,
            })),
            IndexEntry::NoArtifact => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(text: &str) -> IndexTree {
        ItemIndexBuilder.build_index(text).unwrap()
    }

    fn outline(nodes: &[IndexNode]) -> Vec<(ItemKind, &str)> {
        nodes.iter().map(|n| (n.kind, n.name.as_str())).collect()
    }

    #[test]
    fn top_level_items() {
        let tree = build(
            "pub fn f() {} struct S { x: u8 } enum E { A } const C: u8 = 1; \
             static mut X: u8 = 2; type T = u8; pub const fn g() {} macro_rules! m { () => {} }",
        );
        assert_eq!(
            outline(&tree.items),
            vec![
                (ItemKind::Function, "f"),
                (ItemKind::Struct, "S"),
                (ItemKind::Enum, "E"),
                (ItemKind::Const, "C"),
                (ItemKind::Static, "X"),
                (ItemKind::TypeAlias, "T"),
                (ItemKind::Function, "g"),
                (ItemKind::Macro, "m"),
            ]
        );
        assert_eq!(tree.items[0].offset, 4);
    }

    #[test]
    fn nested_members() {
        let tree = build(
            "mod outer { fn inner() {} } trait Tr { fn req(&self); } \
             impl<T> Tr for Wrapper<T> { fn req(&self) {} }",
        );
        assert_eq!(
            outline(&tree.items),
            vec![
                (ItemKind::Module, "outer"),
                (ItemKind::Trait, "Tr"),
                (ItemKind::Impl, "Wrapper"),
            ]
        );
        assert_eq!(outline(&tree.items[0].children), vec![(ItemKind::Function, "inner")]);
        assert_eq!(outline(&tree.items[2].children), vec![(ItemKind::Function, "req")]);
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.find("inner").map(|n| n.kind), Some(ItemKind::Function));
    }

    #[test]
    fn inherent_impl_with_path() {
        let tree = build("impl crate::a::Thing { const N: u8 = 0; }");
        assert_eq!(tree.items[0].name, "Thing");
        assert_eq!(outline(&tree.items[0].children), vec![(ItemKind::Const, "N")]);
    }

    #[test]
    fn function_bodies_are_not_scanned() {
        let tree = build("fn f() { fn hidden() {} }");
        assert_eq!(tree.len(), 1);
        assert!(tree.find("hidden").is_none());
    }

    #[test]
    fn expressions_have_an_empty_tree() {
        let tree = build("1 + 2");
        assert!(tree.is_empty());
    }

    #[test]
    fn no_artifact_for_empty_or_broken_text() {
        assert_eq!(ItemIndexBuilder.build_index("   "), None);
        assert_eq!(ItemIndexBuilder.build_index("fn f( {"), None);
    }

    #[test]
    fn entries_resolve_through_the_name_table() {
        let dir = tempfile::tempdir().unwrap();
        let (names, _) = NameTable::open(&dir.path().join("stub.names")).unwrap();
        let tree = build("mod m { struct S; }");
        let entry = IndexEntry::encode(Some(&tree), &names);
        assert_eq!(entry.decode(&names).unwrap(), Some(tree));
        assert_eq!(
            IndexEntry::encode(None, &names).decode(&names).unwrap(),
            None
        );
    }

    #[test]
    fn dangling_name_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (names, _) = NameTable::open(&dir.path().join("stub.names")).unwrap();
        let entry = IndexEntry::Tree(vec![StoredIndexNode {
            kind: ItemKind::Function,
            name: Ident::from_raw(99),
            offset: 0,
            children: Vec::new(),
        }]);
        assert!(matches!(
            entry.decode(&names),
            Err(CacheError::UnknownName { id: 99 })
        ));
    }
}
