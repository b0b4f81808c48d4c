//! A small strict parser for the HTML subset the engine works on: elements
//! with attributes, text, comments and void tags. Entities are decoded with
//! `html-escape`. Whitespace-only text between tags is dropped so that text
//! node ordinals stay stable across pretty-printed input.

use super::{NodeId, Page};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input at byte {pos}")]
    UnexpectedEof { pos: usize },
    #[error("malformed tag at byte {pos}")]
    MalformedTag { pos: usize },
    #[error("closing </{found}> at byte {pos} does not match open <{expected}>")]
    MismatchedClosingTag {
        expected: String,
        found: String,
        pos: usize,
    },
    #[error("closing </{found}> at byte {pos} has no matching open tag")]
    UnexpectedClosingTag { found: String, pos: usize },
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub(crate) fn parse_document(html: &str) -> Result<Page, ParseError> {
    let mut page = Page::new();
    let mut parser = Parser {
        input: html,
        pos: 0,
    };
    parser.run(&mut page)?;
    Ok(page)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn run(&mut self, page: &mut Page) -> Result<(), ParseError> {
        let root = page.root();
        // Open elements above the root, innermost last.
        let mut stack: Vec<(NodeId, String)> = Vec::new();

        while self.pos < self.input.len() {
            let parent = stack.last().map(|(id, _)| *id).unwrap_or(root);
            if self.eat("<!--") {
                self.skip_past("-->")?;
            } else if self.peek_is("<!") || self.peek_is("<?") {
                self.skip_past(">")?;
            } else if self.eat("</") {
                self.close_tag(&mut stack)?;
            } else if self.peek_is("<") {
                self.open_tag(page, parent, &mut stack)?;
            } else {
                self.text_run(page, parent);
            }
        }

        if let Some((_, tag)) = stack.last() {
            return Err(ParseError::MismatchedClosingTag {
                expected: tag.clone(),
                found: String::new(),
                pos: self.input.len(),
            });
        }
        Ok(())
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_is(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.peek_is(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn skip_past(&mut self, marker: &str) -> Result<(), ParseError> {
        match self.rest().find(marker) {
            Some(at) => {
                self.pos += at + marker.len();
                Ok(())
            }
            None => Err(ParseError::UnexpectedEof { pos: self.pos }),
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn tag_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        let rest = self.rest();
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(ParseError::MalformedTag { pos: start });
        }
        self.pos += end;
        Ok(rest[..end].to_ascii_lowercase())
    }

    fn close_tag(&mut self, stack: &mut Vec<(NodeId, String)>) -> Result<(), ParseError> {
        let pos = self.pos;
        let name = self.tag_name()?;
        self.skip_whitespace();
        if !self.eat(">") {
            return Err(ParseError::MalformedTag { pos });
        }
        match stack.pop() {
            Some((_, open)) if open == name => Ok(()),
            Some((_, open)) => Err(ParseError::MismatchedClosingTag {
                expected: open,
                found: name,
                pos,
            }),
            None => Err(ParseError::UnexpectedClosingTag { found: name, pos }),
        }
    }

    fn open_tag(
        &mut self,
        page: &mut Page,
        parent: NodeId,
        stack: &mut Vec<(NodeId, String)>,
    ) -> Result<(), ParseError> {
        let pos = self.pos;
        self.pos += 1; // consume '<'
        let name = self.tag_name()?;
        let element = page.create_element(&name);

        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            if self.eat("/>") {
                self_closing = true;
                break;
            }
            if self.eat(">") {
                break;
            }
            if self.pos >= self.input.len() {
                return Err(ParseError::UnexpectedEof { pos });
            }
            let (attr_name, attr_value) = self.attribute()?;
            page.set_attr(element, &attr_name, &attr_value);
        }

        page.append_child(parent, element);
        if !self_closing && !VOID_TAGS.contains(&name.as_str()) {
            stack.push((element, name));
        }
        Ok(())
    }

    fn attribute(&mut self) -> Result<(String, String), ParseError> {
        let start = self.pos;
        let rest = self.rest();
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/')
            .unwrap_or(rest.len());
        if name_end == 0 {
            return Err(ParseError::MalformedTag { pos: start });
        }
        let name = rest[..name_end].to_ascii_lowercase();
        self.pos += name_end;

        self.skip_whitespace();
        if !self.eat("=") {
            return Ok((name, String::new()));
        }
        self.skip_whitespace();

        let rest = self.rest();
        let value = if let Some(quote) = rest.chars().next().filter(|&c| c == '"' || c == '\'') {
            let inner = &rest[1..];
            let end = inner
                .find(quote)
                .ok_or(ParseError::UnexpectedEof { pos: self.pos })?;
            self.pos += 1 + end + 1;
            html_escape::decode_html_entities(&inner[..end]).into_owned()
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '>')
                .unwrap_or(rest.len());
            if end == 0 {
                return Err(ParseError::MalformedTag { pos: self.pos });
            }
            self.pos += end;
            html_escape::decode_html_entities(&rest[..end]).into_owned()
        };
        Ok((name, value))
    }

    fn text_run(&mut self, page: &mut Page, parent: NodeId) {
        let rest = self.rest();
        let end = rest.find('<').unwrap_or(rest.len());
        let raw = &rest[..end];
        self.pos += end;
        if raw.trim().is_empty() {
            return;
        }
        let decoded = html_escape::decode_html_entities(raw);
        let text = page.create_text(&decoded);
        page.append_child(parent, text);
    }
}
