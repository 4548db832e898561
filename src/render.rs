//! Whiteboard rendering: markdown + math spans + code blocks to HTML.
//!
//! This layer never looks at model output. It takes already-formatted
//! `WhiteboardContent` plus the session's view state and decides what the
//! whiteboard pane shows.

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use serde::Serialize;

use crate::domain::{Subject, WhiteboardContent};

pub const SELECT_SUBJECT: &str = "Select a subject to begin";
pub const ASK_QUESTION: &str = "Ask your question to begin";
pub const START_CALL: &str = "Start a call to ask your question";

/// Everything the whiteboard pane depends on.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoardView<'a> {
    pub content: Option<&'a WhiteboardContent>,
    pub processing: bool,
    pub subject: Option<Subject>,
    pub call_active: bool,
}

/// What the whiteboard pane should display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Board {
    Loading,
    Placeholder { message: String },
    Content { html: String },
}

pub fn render_whiteboard(view: &BoardView<'_>) -> Board {
    if view.processing {
        return Board::Loading;
    }
    if let Some(content) = view.content.filter(|c| !c.steps.trim().is_empty()) {
        return Board::Content { html: render_markdown(&content.steps) };
    }
    let message = match (view.subject, view.call_active) {
        (None, _) => SELECT_SUBJECT,
        (Some(_), true) => ASK_QUESTION,
        (Some(_), false) => START_CALL,
    };
    Board::Placeholder { message: message.to_string() }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn math_span(tex: &str, display: &str) -> CowStr<'static> {
    format!(r#"<span class="math" data-display="{display}">{}</span>"#, escape_html(tex)).into()
}

/// Render markdown to HTML. `$..$` / `$$..$$` become math spans holding the
/// escaped TeX for client-side typesetting; fenced code is kept verbatim.
/// Raw HTML in the input (question or model text) is escaped, never emitted.
pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_MATH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let events = Parser::new_ext(text, options).map(|event| match event {
        Event::InlineMath(tex) => Event::InlineHtml(math_span(&tex, "inline")),
        Event::DisplayMath(tex) => Event::InlineHtml(math_span(&tex, "block")),
        Event::Start(Tag::CodeBlock(kind)) => {
            let lang = match &kind {
                CodeBlockKind::Fenced(info) => info.split_whitespace().next().unwrap_or_default().to_string(),
                CodeBlockKind::Indented => String::new(),
            };
            let open = if lang.is_empty() {
                r#"<pre class="code-block"><code>"#.to_string()
            } else {
                format!(r#"<pre class="code-block"><code class="language-{}">"#, escape_html(&lang))
            };
            Event::Html(open.into())
        }
        Event::End(TagEnd::CodeBlock) => Event::Html("</code></pre>\n".into()),
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 2);
    html::push_html(&mut out, events);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingConfig;
    use crate::format::default_visual;
    use crate::domain::{Concepts, Practice};

    fn content(steps: &str) -> WhiteboardContent {
        WhiteboardContent {
            steps: steps.into(),
            visual: default_visual(&SamplingConfig { resolution: 4 }),
            practice: Practice::default(),
            concepts: Concepts::default(),
        }
    }

    #[test]
    fn placeholder_without_subject() {
        let board = render_whiteboard(&BoardView::default());
        assert_eq!(board, Board::Placeholder { message: SELECT_SUBJECT.into() });
    }

    #[test]
    fn loading_wins_over_everything() {
        let c = content("# hi");
        let view = BoardView { content: Some(&c), processing: true, subject: Some(Subject::Math), call_active: true };
        assert_eq!(render_whiteboard(&view), Board::Loading);
    }

    #[test]
    fn active_call_without_content_prompts_for_question() {
        let view = BoardView { subject: Some(Subject::Math), call_active: true, ..Default::default() };
        assert_eq!(render_whiteboard(&view), Board::Placeholder { message: ASK_QUESTION.into() });
        let idle = BoardView { subject: Some(Subject::Science), ..Default::default() };
        assert_eq!(render_whiteboard(&idle), Board::Placeholder { message: START_CALL.into() });
    }

    #[test]
    fn renders_markdown_content() {
        let c = content("# Test Header\n\nTest content with *emphasis*");
        let view = BoardView { content: Some(&c), ..Default::default() };
        let Board::Content { html } = render_whiteboard(&view) else { panic!("expected content") };
        assert!(html.contains("<h1>Test Header</h1>"));
        assert!(html.contains("<em>emphasis</em>"));
    }

    #[test]
    fn math_spans_are_preserved_for_typesetting() {
        let html = render_markdown("When $a \\neq 0$, solve $$ax^2 + bx + c = 0$$");
        assert!(html.contains(r#"<span class="math" data-display="inline">a \neq 0</span>"#));
        assert!(html.contains(r#"data-display="block""#));
        assert!(html.contains("ax^2 + bx + c = 0"));
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = render_markdown("Your Question: <img src=x onerror=alert(1)>\n\n<script>alert(2)</script>");
        assert!(!html.contains("<script"), "{html}");
        assert!(!html.contains("<img"), "{html}");
        assert!(html.contains("&lt;script&gt;alert(2)&lt;/script&gt;"));
        assert!(html.contains("&lt;img src=x onerror=alert(1)&gt;"));
    }

    #[test]
    fn escaping_keeps_generated_markup() {
        let html = render_markdown("<b>hi</b> when $a < b$\n\n```js\n<div>\n```");
        assert!(html.contains(r#"<span class="math" data-display="inline">a &lt; b</span>"#), "{html}");
        assert!(html.contains(r#"<pre class="code-block"><code class="language-js">&lt;div&gt;"#), "{html}");
        assert!(html.contains("&lt;b&gt;"));
    }

    #[test]
    fn code_blocks_are_kept_verbatim() {
        let html = render_markdown("```python\ndef hello():\n    print(\"Hello\")\n```");
        assert!(html.contains(r#"<pre class="code-block"><code class="language-python">"#));
        assert!(html.contains("def hello():\n    print("));

        let plain = render_markdown("```\na < b\n```");
        assert!(plain.contains(r#"<pre class="code-block"><code>a &lt; b"#));
    }
}
