// The result area: what the user sees next to the drawing.

use std::sync::LazyLock;

use regex::Regex;

// `**bold**` on a single line, shortest match.
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("emphasis pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResultView {
    #[default]
    Placeholder,
    Loading,
    Solution(String),
    Error(String),
}

impl ResultView {
    /// Short keyword for the HUD.
    pub fn status_label(&self) -> &'static str {
        match self {
            ResultView::Placeholder => "READY",
            ResultView::Loading => "SOLVING",
            ResultView::Solution(_) => "SOLVED",
            ResultView::Error(_) => "ERROR",
        }
    }

    /// HTML fragment for the result panel.
    pub fn to_html(&self) -> String {
        match self {
            ResultView::Placeholder => concat!(
                "<div class=\"placeholder-text\">\n",
                "  <p>Draw your mathematical expression on the canvas</p>\n",
                "  <p>Then click <strong>Calculate</strong> to get AI-powered solutions!</p>\n",
                "</div>\n"
            )
            .to_string(),
            ResultView::Loading => concat!(
                "<div class=\"loading-animation\" style=\"display: flex;\">\n",
                "  <div class=\"spinner\"></div>\n",
                "  <p>AI is analyzing your handwritten expression...</p>\n",
                "</div>\n"
            )
            .to_string(),
            ResultView::Solution(text) => format!(
                "<div class=\"solution-text\">\n  <h4>Solution:</h4>\n  <div class=\"step\">{}</div>\n</div>\n",
                format_solution_html(text)
            ),
            ResultView::Error(msg) => format!("<div class=\"error-message\">{msg}</div>\n"),
        }
    }

    /// Plain text for the terminal.
    pub fn to_terminal(&self) -> String {
        match self {
            ResultView::Placeholder => {
                "Draw your mathematical expression, then press Enter to solve.".to_string()
            }
            ResultView::Loading => "AI is analyzing your handwritten expression...".to_string(),
            ResultView::Solution(text) => {
                format!("Solution:\n{}", EMPHASIS.replace_all(text, "${1}"))
            }
            ResultView::Error(msg) => format!("Error: {msg}"),
        }
    }
}

/// Escape markup, then turn `**bold**` into `<strong>`, blank lines into
/// paragraph breaks and single newlines into `<br>`.
pub fn format_solution_html(text: &str) -> String {
    let escaped = text.replace('<', "&lt;").replace('>', "&gt;");
    EMPHASIS
        .replace_all(&escaped, "<strong>${1}</strong>")
        .replace("\n\n", "</p><p>")
        .replace('\n', "<br>")
}
