//! Selector engine – parses and matches the selector subset used by
//! `exclude` lists and `<style>` sheets.
//!
//! Supported: type, `*`, `#id`, `.class`, attribute selectors
//! (`[a]`, `=`, `~=`, `^=`, `$=`, `*=`), descendant and child combinators,
//! comma lists, and a trailing `::before` / `::after`.

use crate::dom::{Document, NodeData, NodeId};

/// Errors produced while parsing a selector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected {found:?} at offset {offset} in `{selector}`")]
    Unexpected {
        selector: String,
        offset: usize,
        found: char,
    },
    #[error("unexpected end of selector `{0}`")]
    UnexpectedEnd(String),
    #[error("unsupported pseudo selector `{0}`")]
    UnsupportedPseudo(String),
}

/// Pseudo-elements that generate boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PseudoElement {
    Before,
    After,
}

impl PseudoElement {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim_start_matches(':').to_ascii_lowercase().as_str() {
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "::before",
            Self::After => "::after",
        }
    }

    /// Bare name, as used in marker attributes.
    pub fn name(&self) -> &'static str {
        &self.as_str()[2..]
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AttrOp {
    Exists,
    Equals(String),
    Includes(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
}

#[derive(Debug, Clone, PartialEq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
}

impl AttrSelector {
    fn matches(&self, value: Option<&str>) -> bool {
        let Some(v) = value else {
            return false;
        };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(x) => v == x,
            AttrOp::Includes(x) => v.split_whitespace().any(|w| w == x),
            AttrOp::Prefix(x) => !x.is_empty() && v.starts_with(x.as_str()),
            AttrOp::Suffix(x) => !x.is_empty() && v.ends_with(x.as_str()),
            AttrOp::Substring(x) => !x.is_empty() && v.contains(x.as_str()),
        }
    }
}

/// A compound selector such as `div.card[data-x]`.
#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(el) = doc.element(node) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if *tag != el.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.attr("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = doc.classes(node);
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|a| a.matches(el.attr(&a.name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

/// One complex selector: compounds joined by combinators, left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
    pub pseudo: Option<PseudoElement>,
}

/// `(id, class-like, type)` counts, compared lexicographically.
pub type Specificity = (u32, u32, u32);

impl Selector {
    pub fn specificity(&self) -> Specificity {
        let mut s = (0, 0, u32::from(self.pseudo.is_some()));
        for c in &self.compounds {
            s.0 += u32::from(c.id.is_some());
            s.1 += (c.classes.len() + c.attrs.len()) as u32;
            s.2 += u32::from(c.tag.is_some());
        }
        s
    }

    /// Match the element itself; selectors ending in a pseudo-element never
    /// match an element.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.pseudo.is_none() && self.matches_from(doc, node, self.compounds.len() - 1)
    }

    /// Match the given pseudo-element of `node`.
    pub fn matches_pseudo(&self, doc: &Document, node: NodeId, pseudo: PseudoElement) -> bool {
        self.pseudo == Some(pseudo) && self.matches_from(doc, node, self.compounds.len() - 1)
    }

    fn matches_from(&self, doc: &Document, node: NodeId, idx: usize) -> bool {
        if !self.compounds[idx].matches(doc, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match self.combinators[idx - 1] {
            Combinator::Child => match element_parent(doc, node) {
                Some(p) => self.matches_from(doc, p, idx - 1),
                None => false,
            },
            Combinator::Descendant => {
                let mut cur = element_parent(doc, node);
                while let Some(anc) = cur {
                    if self.matches_from(doc, anc, idx - 1) {
                        return true;
                    }
                    cur = element_parent(doc, anc);
                }
                false
            }
        }
    }
}

/// Parent element within the same tree; shadow roots and the document end
/// the walk.
fn element_parent(doc: &Document, node: NodeId) -> Option<NodeId> {
    let parent = doc.parent(node)?;
    match doc.node(parent).data {
        NodeData::Element(_) => Some(parent),
        _ => None,
    }
}

/// Comma-separated selector list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(pub Vec<Selector>);

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let parts = split_top_level(input, ',');
        if parts.iter().all(|p| p.trim().is_empty()) {
            return Err(SelectorError::Empty);
        }
        let mut selectors = Vec::with_capacity(parts.len());
        for part in parts {
            selectors.push(SelectorParser::new(part.trim()).parse()?);
        }
        Ok(Self(selectors))
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.0.iter().any(|s| s.matches(doc, node))
    }
}

/// Split on `sep` outside brackets and quotes.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') | (None, '(') => depth += 1,
            (None, ']') | (None, ')') => depth -= 1,
            (None, c) if c == sep && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct SelectorParser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> SelectorParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Selector, SelectorError> {
        let mut compounds = Vec::new();
        let mut combinators = Vec::new();
        let mut pseudo = None;
        let mut pending: Option<Combinator> = None;

        loop {
            let had_ws = self.skip_whitespace();
            let Some(c) = self.peek() else {
                break;
            };
            if pseudo.is_some() {
                return Err(self.unexpected(c));
            }
            if c == '>' {
                if compounds.is_empty() || pending == Some(Combinator::Child) {
                    return Err(self.unexpected(c));
                }
                pending = Some(Combinator::Child);
                self.pos += 1;
                continue;
            }
            if !compounds.is_empty() {
                match pending.take() {
                    Some(comb) => combinators.push(comb),
                    None if had_ws => combinators.push(Combinator::Descendant),
                    None => return Err(self.unexpected(c)),
                }
            }
            let (compound, pe) = self.parse_compound()?;
            compounds.push(compound);
            pseudo = pe;
        }

        if compounds.is_empty() {
            return Err(SelectorError::Empty);
        }
        if pending.is_some() {
            return Err(SelectorError::UnexpectedEnd(self.input.to_string()));
        }
        Ok(Selector {
            compounds,
            combinators,
            pseudo,
        })
    }

    fn parse_compound(&mut self) -> Result<(Compound, Option<PseudoElement>), SelectorError> {
        let mut compound = Compound::default();
        let start = self.pos;
        let mut pseudo = None;
        while let Some(c) = self.peek() {
            match c {
                '*' if self.pos == start => self.pos += 1,
                '#' => {
                    self.pos += 1;
                    compound.id = Some(self.ident()?);
                }
                '.' => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                '[' => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                ':' => {
                    self.pos += 1;
                    let double = self.peek() == Some(':');
                    if double {
                        self.pos += 1;
                    }
                    let name = self.ident()?;
                    match PseudoElement::parse(&name) {
                        Some(pe) => {
                            pseudo = Some(pe);
                            break;
                        }
                        None => {
                            let prefix = if double { "::" } else { ":" };
                            return Err(SelectorError::UnsupportedPseudo(format!(
                                "{prefix}{name}"
                            )));
                        }
                    }
                }
                c if self.pos == start && is_ident_char(c) => {
                    compound.tag = Some(self.ident()?.to_ascii_lowercase());
                }
                c if c.is_whitespace() || c == '>' => break,
                other => return Err(self.unexpected(other)),
            }
        }
        if self.pos == start {
            return match self.peek() {
                Some(c) => Err(self.unexpected(c)),
                None => Err(SelectorError::UnexpectedEnd(self.input.to_string())),
            };
        }
        Ok((compound, pseudo))
    }

    fn attribute(&mut self) -> Result<AttrSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_whitespace();
        let op_char = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrSelector {
                    name,
                    op: AttrOp::Exists,
                });
            }
            Some('=') => '=',
            Some(c @ ('~' | '^' | '$' | '*')) => {
                self.pos += 1;
                if self.peek() != Some('=') {
                    return Err(self.unexpected_or_end());
                }
                c
            }
            _ => return Err(self.unexpected_or_end()),
        };
        self.pos += 1; // '='
        self.skip_whitespace();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != q) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(SelectorError::UnexpectedEnd(self.input.to_string()));
                }
                let v: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                v
            }
            _ => self.ident()?,
        };
        self.skip_whitespace();
        if self.peek() != Some(']') {
            return Err(self.unexpected_or_end());
        }
        self.pos += 1;
        let op = match op_char {
            '=' => AttrOp::Equals(value),
            '~' => AttrOp::Includes(value),
            '^' => AttrOp::Prefix(value),
            '$' => AttrOp::Suffix(value),
            _ => AttrOp::Substring(value),
        };
        Ok(AttrSelector { name, op })
    }

    fn ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected_or_end());
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn unexpected(&self, found: char) -> SelectorError {
        SelectorError::Unexpected {
            selector: self.input.to_string(),
            offset: self.pos,
            found,
        }
    }

    fn unexpected_or_end(&self) -> SelectorError {
        match self.peek() {
            Some(c) => self.unexpected(c),
            None => SelectorError::UnexpectedEnd(self.input.to_string()),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

// ---------------------------------------------------------------------------
// Document queries
// ---------------------------------------------------------------------------

impl Document {
    /// All light-tree elements matching `selector`, in document order.
    pub fn select_all(&self, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .descendants(self.root())
            .into_iter()
            .filter(|n| list.matches(self, *n))
            .collect())
    }

    pub fn find_first(&self, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        let list = SelectorList::parse(selector)?;
        Ok(self
            .descendants(self.root())
            .into_iter()
            .find(|n| list.matches(self, *n)))
    }
}
