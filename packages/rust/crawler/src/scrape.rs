//! Page title and description extraction.

use std::cell::RefCell;

use html5ever::tokenizer::{Tag, TagKind, Token, TokenSink, TokenSinkResult};

use crate::html;

/// Metadata scraped from a page's `<head>`. Empty strings mean "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
}

/// Extract the page title and description from an HTML body.
///
/// The first `<title>` wins; `og:title` is only a fallback for pages without
/// one. The description is the first non-empty `name="description"` or
/// `property="og:description"` meta content, whichever comes first.
pub fn scrape_metadata(body: &[u8]) -> PageMeta {
    let text = String::from_utf8_lossy(body);
    let sink = html::tokenize(MetaSink::default(), &text);
    sink.state.into_inner().into_meta()
}

#[derive(Default)]
struct MetaState {
    in_title: bool,
    title_seen: bool,
    title: String,
    og_title: String,
    description: String,
}

impl MetaState {
    fn meta_tag(&mut self, tag: &Tag) {
        let content = match html::attr(tag, "content").map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => return,
        };
        let name = html::attr(tag, "name").map(str::to_ascii_lowercase);
        let property = html::attr(tag, "property").map(str::to_ascii_lowercase);

        let is_description = name.as_deref() == Some("description")
            || property.as_deref() == Some("og:description");
        if is_description && self.description.is_empty() {
            self.description = content.to_string();
        }
        if property.as_deref() == Some("og:title") && self.og_title.is_empty() {
            self.og_title = content.to_string();
        }
    }

    fn into_meta(self) -> PageMeta {
        let mut title = html::collapse_whitespace(&self.title);
        if title.is_empty() {
            title = html::collapse_whitespace(&self.og_title);
        }
        PageMeta {
            title,
            description: self.description,
        }
    }
}

#[derive(Default)]
struct MetaSink {
    state: RefCell<MetaState>,
}

impl TokenSink for MetaSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let mut state = self.state.borrow_mut();
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => {
                    match &*tag.name {
                        "title" if !state.title_seen => state.in_title = true,
                        "meta" => state.meta_tag(&tag),
                        _ => {}
                    }
                    if let Some(kind) = html::raw_kind(&tag) {
                        return TokenSinkResult::RawData(kind);
                    }
                }
                TagKind::EndTag => {
                    if &*tag.name == "title" && state.in_title {
                        state.in_title = false;
                        state.title_seen = true;
                    }
                }
            },
            Token::CharacterTokens(text) if state.in_title => state.title.push_str(&text),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}
