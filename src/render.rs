use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::LazyLock;

static QUIZ_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<qcm-option(?:\s+value\s*=\s*"([^"]*)")?\s*>(.*?)</qcm-option>"#)
        .expect("quiz option pattern is valid")
});

static CONTAINER_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div\s+class\s*=\s*"qcm-container"\s*>\s*$"#)
        .expect("quiz container pattern is valid")
});

static CONTAINER_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*</div>").expect("closing div pattern is valid"));

/// One selectable answer of a quiz question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizOption {
    pub value: Option<String>,
    pub label: String,
}

impl QuizOption {
    /// Text submitted as the user's turn when this option is chosen.
    pub fn submission_text(&self) -> String {
        match &self.value {
            Some(value) if value != &self.label => format!("{}. {}", value, self.label),
            _ => self.label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Markdown(String),
    Diagram { source: String },
    Table { header: Vec<String>, rows: Vec<Vec<String>> },
    Quiz { options: Vec<QuizOption> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMessage {
    pub blocks: Vec<Block>,
}

impl RenderedMessage {
    /// Every quiz option in display order, for numbering choices.
    pub fn quiz_options(&self) -> Vec<&QuizOption> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Quiz { options } => Some(options),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Turns stored message text into displayable blocks.
pub trait Renderer {
    fn render(&self, text: &str) -> RenderedMessage;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, text: &str) -> RenderedMessage {
        let mut blocks = Vec::new();
        let mut cursor = 0;

        for group in quiz_groups(text) {
            parse_markdown(&text[cursor..group.start], &mut blocks);
            blocks.push(Block::Quiz {
                options: group.options,
            });
            cursor = group.end;
        }
        parse_markdown(&text[cursor..], &mut blocks);

        RenderedMessage { blocks }
    }
}

struct QuizGroup {
    start: usize,
    end: usize,
    options: Vec<QuizOption>,
}

/// Runs of quiz options separated only by whitespace, with any enclosing
/// container div included in the span.
fn quiz_groups(text: &str) -> Vec<QuizGroup> {
    let mut groups: Vec<QuizGroup> = Vec::new();

    for caps in QUIZ_OPTION.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let option = QuizOption {
            value: caps
                .get(1)
                .map(|v| v.as_str().trim().to_string())
                .filter(|v| !v.is_empty()),
            label: caps
                .get(2)
                .map(|l| l.as_str().trim().to_string())
                .unwrap_or_default(),
        };

        match groups.last_mut() {
            Some(group) if text[group.end..whole.start()].trim().is_empty() => {
                group.end = whole.end();
                group.options.push(option);
            }
            _ => groups.push(QuizGroup {
                start: whole.start(),
                end: whole.end(),
                options: vec![option],
            }),
        }
    }

    let mut floor = 0;
    for group in &mut groups {
        if let Some(open) = CONTAINER_OPEN.find(&text[floor..group.start]) {
            group.start = floor + open.start();
        }
        if let Some(close) = CONTAINER_CLOSE.find(&text[group.end..]) {
            group.end += close.end();
        }
        floor = group.end;
    }

    groups
}

fn push_markdown(source: &str, blocks: &mut Vec<Block>) {
    let trimmed = source.trim();
    if !trimmed.is_empty() {
        blocks.push(Block::Markdown(trimmed.to_string()));
    }
}

fn is_diagram(kind: &CodeBlockKind) -> bool {
    match kind {
        CodeBlockKind::Fenced(info) => info
            .split_whitespace()
            .next()
            .is_some_and(|lang| lang.eq_ignore_ascii_case("mermaid")),
        CodeBlockKind::Indented => false,
    }
}

/// Lifts diagrams and tables out of a markdown segment; the prose between
/// them stays as raw markdown.
fn parse_markdown(source: &str, blocks: &mut Vec<Block>) {
    let mut cursor = 0;
    let mut events = Parser::new_ext(source, Options::ENABLE_TABLES).into_offset_iter();

    while let Some((event, range)) = events.next() {
        match event {
            Event::Start(Tag::CodeBlock(kind)) if is_diagram(&kind) => {
                push_markdown(&source[cursor..range.start], blocks);

                let mut diagram = String::new();
                for (event, _) in events.by_ref() {
                    match event {
                        Event::Text(text) => diagram.push_str(&text),
                        Event::End(TagEnd::CodeBlock) => break,
                        _ => {}
                    }
                }
                blocks.push(Block::Diagram {
                    source: diagram.trim_end().to_string(),
                });
                cursor = range.end;
            }
            Event::Start(Tag::Table(_)) => {
                push_markdown(&source[cursor..range.start], blocks);
                blocks.push(collect_table(events.by_ref().map(|(event, _)| event)));
                cursor = range.end;
            }
            _ => {}
        }
    }

    push_markdown(&source[cursor.min(source.len())..], blocks);
}

fn collect_table<'a>(events: impl Iterator<Item = Event<'a>>) -> Block {
    let mut header = Vec::new();
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();

    for event in events {
        match event {
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => row.clear(),
            Event::Start(Tag::TableCell) => cell.clear(),
            Event::Text(text) | Event::Code(text) => cell.push_str(&text),
            Event::SoftBreak | Event::HardBreak => cell.push(' '),
            Event::End(TagEnd::TableCell) => row.push(cell.trim().to_string()),
            Event::End(TagEnd::TableHead) => header = std::mem::take(&mut row),
            Event::End(TagEnd::TableRow) => rows.push(std::mem::take(&mut row)),
            Event::End(TagEnd::Table) => break,
            _ => {}
        }
    }

    Block::Table { header, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(text: &str) -> Vec<Block> {
        MarkdownRenderer.render(text).blocks
    }

    fn option(value: Option<&str>, label: &str) -> QuizOption {
        QuizOption {
            value: value.map(str::to_string),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_plain_prose_is_one_markdown_block() {
        let blocks = render("## La faute\n\nLa faute est un **manquement** à une obligation.");
        assert_eq!(
            blocks,
            vec![Block::Markdown(
                "## La faute\n\nLa faute est un **manquement** à une obligation.".to_string()
            )]
        );
    }

    #[test]
    fn test_empty_text_has_no_blocks() {
        assert!(render("  \n").is_empty());
    }

    #[test]
    fn test_mermaid_fence_becomes_diagram() {
        let blocks = render("Voici :\n\n```mermaid\ngraph TD\nA-->B\n```\n\nFin.");
        assert_eq!(
            blocks,
            vec![
                Block::Markdown("Voici :".to_string()),
                Block::Diagram {
                    source: "graph TD\nA-->B".to_string()
                },
                Block::Markdown("Fin.".to_string()),
            ]
        );
    }

    #[test]
    fn test_other_code_fences_stay_markdown() {
        let text = "```text\nArticle 1240\n```";
        assert_eq!(render(text), vec![Block::Markdown(text.to_string())]);
    }

    #[test]
    fn test_table_is_extracted() {
        let blocks = render(
            "Comparaison :\n\n| Régime | Délai |\n|---|---|\n| Civil | 5 ans |\n| Pénal | `6 ans` |\n",
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], Block::Markdown("Comparaison :".to_string()));
        assert_eq!(
            blocks[1],
            Block::Table {
                header: vec!["Régime".to_string(), "Délai".to_string()],
                rows: vec![
                    vec!["Civil".to_string(), "5 ans".to_string()],
                    vec!["Pénal".to_string(), "6 ans".to_string()],
                ],
            }
        );
    }

    #[test]
    fn test_quiz_container_is_absorbed() {
        let text = "**Question 1** : qui juge ?\n<div class=\"qcm-container\">\n<qcm-option value=\"A\">Le juge</qcm-option>\n<qcm-option value=\"B\">Le préfet</qcm-option>\n</div>\nRéponds.";
        let blocks = render(text);
        assert_eq!(
            blocks,
            vec![
                Block::Markdown("**Question 1** : qui juge ?".to_string()),
                Block::Quiz {
                    options: vec![option(Some("A"), "Le juge"), option(Some("B"), "Le préfet")]
                },
                Block::Markdown("Réponds.".to_string()),
            ]
        );
    }

    #[test]
    fn test_separate_quiz_runs_stay_separate() {
        let text = "<qcm-option>Vrai</qcm-option> <qcm-option>Faux</qcm-option>\n\nPuis :\n\n<qcm-option value=\"1\">Oui</qcm-option>";
        let rendered = MarkdownRenderer.render(text);

        assert_eq!(rendered.blocks.len(), 3);
        assert_eq!(
            rendered.blocks[0],
            Block::Quiz {
                options: vec![option(None, "Vrai"), option(None, "Faux")]
            }
        );
        assert_eq!(rendered.blocks[1], Block::Markdown("Puis :".to_string()));

        let labels: Vec<&str> = rendered
            .quiz_options()
            .iter()
            .map(|o| o.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Vrai", "Faux", "Oui"]);
    }

    #[test]
    fn test_submission_text() {
        assert_eq!(option(Some("A"), "Le juge").submission_text(), "A. Le juge");
        assert_eq!(option(Some("Vrai"), "Vrai").submission_text(), "Vrai");
        assert_eq!(option(None, "Faux").submission_text(), "Faux");
    }

    #[test]
    fn test_blank_value_is_ignored() {
        let blocks = render("<qcm-option value=\" \">Peut-être</qcm-option>");
        assert_eq!(
            blocks,
            vec![Block::Quiz {
                options: vec![option(None, "Peut-être")]
            }]
        );
    }
}
