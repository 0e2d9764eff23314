//! Hacker News item pages (`news.ycombinator.com/item?id=N`).

use std::cell::RefCell;

use async_trait::async_trait;
use html5ever::LocalName;
use html5ever::tokenizer::{Tag, TagKind, Token, TokenSink, TokenSinkResult};
use tracing::instrument;
use url::Url;

use dredger_shared::{DredgerError, Result};

use super::{AggregatorResolver, Resolution};
use crate::fetch::Fetcher;
use crate::html;

pub const HN_HOST: &str = "news.ycombinator.com";

/// Comments kept per item page.
pub const MAX_COMMENTS: usize = 10;

/// Comments longer than this many characters are cut and suffixed with `...`.
pub const MAX_COMMENT_CHARS: usize = 500;

/// Resolves HN discussion pages to the submitted article.
#[derive(Debug, Clone)]
pub struct HackerNewsResolver {
    host: String,
}

impl HackerNewsResolver {
    pub fn new() -> Self {
        Self::for_host(HN_HOST)
    }

    /// Match item pages on a different host, e.g. a mirror or a local test server.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl Default for HackerNewsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AggregatorResolver for HackerNewsResolver {
    fn name(&self) -> &str {
        "hacker-news"
    }

    fn matches(&self, url: &Url) -> bool {
        url.host_str() == Some(self.host.as_str())
            && url.path() == "/item"
            && url
                .query_pairs()
                .find(|(k, _)| k == "id")
                .is_some_and(|(_, v)| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
    }

    #[instrument(skip(self, fetcher, url), fields(url = %url))]
    async fn resolve(&self, fetcher: &Fetcher, url: &Url) -> Result<Resolution> {
        let page = fetcher
            .fetch(url.as_str())
            .await
            .map_err(|e| DredgerError::Resolve(format!("fetch HN page: {e}")))?;

        let item = parse_item_page(&page.text());
        let href = match item.title_link {
            Some(TitleLink::Article(href)) => href,
            Some(TitleLink::SelfPost) | None => return Ok(Resolution::unresolved(url.as_str())),
        };

        let article = page
            .url
            .join(&href)
            .map_err(|e| DredgerError::Resolve(format!("bad article link {href:?}: {e}")))?;
        if self.matches(&article) {
            return Ok(Resolution::unresolved(url.as_str()));
        }

        Ok(Resolution {
            url: article.to_string(),
            resolved: true,
            comments: item.comments,
        })
    }
}

// ---------------------------------------------------------------------------
// Page parsing
// ---------------------------------------------------------------------------

/// The first link inside the item's `titleline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleLink {
    /// Raw `href` of a submitted article, possibly relative.
    Article(String),
    /// Ask/Show HN and other posts whose title links back to the item itself.
    SelfPost,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HnItemPage {
    pub title_link: Option<TitleLink>,
    pub comments: Vec<String>,
}

/// Parse an item page in one tokenizer pass.
pub fn parse_item_page(html: &str) -> HnItemPage {
    let sink = html::tokenize(ItemSink::default(), html);
    sink.state.into_inner().page
}

/// An open element tracked by tag name and nesting depth of same-named tags.
struct Open {
    name: LocalName,
    depth: usize,
}

impl Open {
    fn new(tag: &Tag) -> Self {
        Self {
            name: tag.name.clone(),
            depth: 1,
        }
    }

    /// Returns `true` when `tag` closes this element.
    fn track(&mut self, tag: &Tag) -> bool {
        if tag.name != self.name {
            return false;
        }
        match tag.kind {
            TagKind::StartTag if !tag.self_closing => self.depth += 1,
            TagKind::StartTag => {}
            TagKind::EndTag => self.depth -= 1,
        }
        self.depth == 0
    }
}

#[derive(Default)]
struct ItemState {
    page: HnItemPage,
    titleline: Option<Open>,
    comment: Option<Open>,
    buf: String,
}

impl ItemState {
    fn title_tag(&mut self, tag: &Tag) {
        if self.page.title_link.is_some() {
            return;
        }
        match &mut self.titleline {
            Some(open) => {
                if tag.kind == TagKind::StartTag && &*tag.name == "a" {
                    if let Some(href) = html::attr(tag, "href") {
                        self.page.title_link = Some(if href.starts_with("item?") {
                            TitleLink::SelfPost
                        } else {
                            TitleLink::Article(href.to_string())
                        });
                        self.titleline = None;
                        return;
                    }
                }
                if open.track(tag) {
                    self.titleline = None;
                }
            }
            None => {
                if tag.kind == TagKind::StartTag && html::has_class(tag, "titleline") {
                    self.titleline = Some(Open::new(tag));
                }
            }
        }
    }

    fn comment_tag(&mut self, tag: &Tag) {
        if self.page.comments.len() >= MAX_COMMENTS {
            return;
        }
        match &mut self.comment {
            Some(open) => {
                if open.track(tag) {
                    self.comment = None;
                    self.finish_comment();
                } else if tag.kind == TagKind::StartTag && matches!(&*tag.name, "p" | "br") {
                    self.buf.push(' ');
                }
            }
            None => {
                if tag.kind == TagKind::StartTag && html::has_class(tag, "commtext") {
                    self.comment = Some(Open::new(tag));
                    self.buf.clear();
                }
            }
        }
    }

    fn finish_comment(&mut self) {
        let text = html::collapse_whitespace(&self.buf);
        self.buf.clear();
        if !text.is_empty() {
            self.page.comments.push(truncate_comment(text));
        }
    }
}

fn truncate_comment(text: String) -> String {
    match text.char_indices().nth(MAX_COMMENT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

#[derive(Default)]
struct ItemSink {
    state: RefCell<ItemState>,
}

impl TokenSink for ItemSink {
    type Handle = ();

    fn process_token(&self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let mut state = self.state.borrow_mut();
        match token {
            Token::TagToken(tag) => {
                state.title_tag(&tag);
                state.comment_tag(&tag);
                if tag.kind == TagKind::StartTag {
                    if let Some(kind) = html::raw_kind(&tag) {
                        return TokenSinkResult::RawData(kind);
                    }
                }
            }
            Token::CharacterTokens(text) if state.comment.is_some() => state.buf.push_str(&text),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn fetcher() -> Fetcher {
        Fetcher::new("TheDredger/test", Duration::from_secs(5), 1 << 20).unwrap()
    }

    #[test]
    fn matches_item_pages_only() {
        let r = HackerNewsResolver::new();
        for u in [
            "https://news.ycombinator.com/item?id=12345",
            "https://news.ycombinator.com/item?id=99999999",
        ] {
            assert!(r.matches(&Url::parse(u).unwrap()), "expected match for {u}");
        }
        for u in [
            "https://example.com",
            "https://news.ycombinator.com/",
            "https://news.ycombinator.com/newest",
            "https://news.ycombinator.com/item",
            "https://news.ycombinator.com/item?id=",
            "https://news.ycombinator.com/item?id=abc",
            "https://news.ycombinator.com/item?id=12x",
            "https://reddit.com/r/rust",
        ] {
            assert!(!r.matches(&Url::parse(u).unwrap()), "expected no match for {u}");
        }
    }

    #[test]
    fn parses_article_and_comments() {
        let page = parse_item_page(&load_fixture("hn_item.html"));
        assert_eq!(
            page.title_link,
            Some(TitleLink::Article("https://example.com/cool-article".into()))
        );
        assert_eq!(
            page.comments,
            vec![
                "This is a great article about Rust performance.".to_string(),
                "I disagree with the benchmarks shown here. They skip the warmup.".to_string(),
                "Has anyone tried this in production? https://example.org/report".to_string(),
            ]
        );
    }

    #[test]
    fn ask_hn_is_a_self_post() {
        let page = parse_item_page(&load_fixture("hn_ask.html"));
        assert_eq!(page.title_link, Some(TitleLink::SelfPost));
    }

    #[test]
    fn span_comments_are_found() {
        let html = r#"<html><body>
<span class="commtext">First comment here.</span>
<span class="commtext">Second <span class="hl">comment</span> with more detail.</span>
<span class="commtext">   </span>
</body></html>"#;
        let page = parse_item_page(html);
        assert_eq!(
            page.comments,
            vec![
                "First comment here.".to_string(),
                "Second comment with more detail.".to_string(),
            ]
        );
    }

    #[test]
    fn no_comments() {
        let page = parse_item_page("<html><body><p>No comments on this page.</p></body></html>");
        assert!(page.comments.is_empty());
        assert_eq!(page.title_link, None);
    }

    #[test]
    fn long_comment_is_truncated() {
        let html = format!(
            r#"<span class="commtext">{}</span>"#,
            "x".repeat(600)
        );
        let page = parse_item_page(&html);
        assert_eq!(page.comments.len(), 1);
        assert_eq!(page.comments[0].chars().count(), MAX_COMMENT_CHARS + 3);
        assert!(page.comments[0].ends_with("..."));
    }

    #[test]
    fn truncation_counts_characters() {
        let text = "é".repeat(MAX_COMMENT_CHARS + 1);
        let cut = truncate_comment(text);
        assert_eq!(cut.chars().count(), MAX_COMMENT_CHARS + 3);

        let exact = "a".repeat(MAX_COMMENT_CHARS);
        assert_eq!(truncate_comment(exact.clone()), exact);
    }

    #[test]
    fn at_most_ten_comments() {
        let mut html = String::from("<html><body>");
        for i in 0..15 {
            let body = if i % 3 == 0 { "word ".repeat(200) } else { format!("Comment {i}") };
            html.push_str(&format!(r#"<div class="commtext c00">{body}</div>"#));
        }
        html.push_str("</body></html>");

        let page = parse_item_page(&html);
        assert_eq!(page.comments.len(), MAX_COMMENTS);
        assert_eq!(page.comments[9].chars().count(), MAX_COMMENT_CHARS + 3);
        assert_eq!(page.comments[8], "Comment 8");
        for c in &page.comments {
            assert!(c.chars().count() <= MAX_COMMENT_CHARS + 3, "comment too long: {}", c.len());
        }
    }

    #[tokio::test]
    async fn resolve_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .and(query_param("id", "12345"))
            .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("hn_item.html")))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/item?id=12345", server.uri())).unwrap();
        let resolver = HackerNewsResolver::for_host("127.0.0.1");
        assert!(resolver.matches(&url));

        let resolution = resolver.resolve(&fetcher(), &url).await.unwrap();
        assert!(resolution.resolved);
        assert_eq!(resolution.url, "https://example.com/cool-article");
        assert_eq!(resolution.comments.len(), 3);
        assert_eq!(
            resolution.comments[0],
            "This is a great article about Rust performance."
        );
    }

    #[tokio::test]
    async fn self_post_is_not_resolved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(load_fixture("hn_ask.html")))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/item?id=999", server.uri())).unwrap();
        let resolution = HackerNewsResolver::for_host("127.0.0.1")
            .resolve(&fetcher(), &url)
            .await
            .unwrap();
        assert!(!resolution.resolved);
        assert_eq!(resolution.url, url.as_str());
        assert!(resolution.comments.is_empty());
    }

    #[tokio::test]
    async fn relative_article_link_is_joined() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<span class="titleline"><a href="/blog/post">Post</a></span>"#,
            ))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/item?id=7", server.uri())).unwrap();
        let resolution = HackerNewsResolver::for_host("127.0.0.1")
            .resolve(&fetcher(), &url)
            .await
            .unwrap();
        assert!(resolution.resolved);
        assert_eq!(resolution.url, format!("{}/blog/post", server.uri()));
    }

    #[tokio::test]
    async fn fetch_failure_is_a_resolve_error() {
        let fetcher = Fetcher::new("TheDredger/test", Duration::from_millis(200), 1 << 20).unwrap();
        // Nothing listens on port 9 of the discard address in the test environment.
        let url = Url::parse("http://127.0.0.1:9/item?id=1").unwrap();
        let err = HackerNewsResolver::for_host("127.0.0.1")
            .resolve(&fetcher, &url)
            .await
            .unwrap_err();
        assert!(matches!(err, DredgerError::Resolve(_)));
        assert!(err.to_string().contains("fetch HN page"));
    }
}
