//! Helpers for driving html5ever's tokenizer without building a tree.

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{BufferQueue, Tag, TokenSink, Tokenizer, TokenizerOpts};

/// Feed `html` through a tokenizer in one forward pass and hand back the sink.
pub(crate) fn tokenize<S: TokenSink>(sink: S, html: &str) -> S {
    let input = BufferQueue::default();
    input.push_back(StrTendril::from_slice(html));

    let tokenizer = Tokenizer::new(sink, TokenizerOpts::default());
    let _ = tokenizer.feed(&input);
    tokenizer.end();
    tokenizer.sink
}

/// Text mode the tree builder would switch the tokenizer into after this
/// start tag. Without it `<script>` bodies would be tokenized as markup.
pub(crate) fn raw_kind(tag: &Tag) -> Option<RawKind> {
    match &*tag.name {
        "title" | "textarea" => Some(RawKind::Rcdata),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "script" => Some(RawKind::ScriptData),
        _ => None,
    }
}

/// Value of the attribute `name` (already lowercase in the token).
pub(crate) fn attr<'a>(tag: &'a Tag, name: &str) -> Option<&'a str> {
    tag.attrs
        .iter()
        .find(|a| &*a.name.local == name)
        .map(|a| &*a.value)
}

/// Whether the tag's `class` attribute contains `class` as a whole token.
pub(crate) fn has_class(tag: &Tag, class: &str) -> bool {
    attr(tag, "class").is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class))
}

/// Trim and collapse runs of whitespace into single spaces.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
