//! Turns raw agent terminal output into coarse activity states.
//!
//! Each session owns an [`OutputClassifier`] holding a bounded window of the
//! most recent output. Every chunk is appended to that window, control
//! sequences are stripped, and the rules in [`RULES`] are evaluated in order.
//! The first rule that matches decides the candidate state, and a transition is
//! reported only when the candidate differs from the current state.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::control_sequences::strip_escape_sequences;

pub const OUTPUT_WINDOW_BYTES: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Read,
    Write,
    Edit,
    Bash,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Prompt,
    Confirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalState {
    #[default]
    Idle,
    Thinking,
    ToolUse {
        tool: ToolKind,
    },
    WaitingInput {
        subtype: InputKind,
    },
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("classifier pattern is valid")
}

static INPUT_PROMPT: Lazy<Regex> = Lazy::new(|| pattern(r"(?mR)^>\s*$"));
static USER_PROMPT: Lazy<Regex> = Lazy::new(|| pattern(r"(?mR)^You:\s*$"));

static CONFIRMATION: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)\(y/n\)", r"(?i)Allow\?", r"(?i)Press Enter to continue"]
        .into_iter()
        .map(pattern)
        .collect()
});

static THINKING: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)Thinking\.\.\.", r"(?i)Reasoning\.\.\."]
        .into_iter()
        .map(pattern)
        .collect()
});

static TOOLS: Lazy<Vec<(Regex, ToolKind)>> = Lazy::new(|| {
    [
        (r#"(?i)Reading\s+(?:file\s+)?["']?([^"'\n]+)["']?"#, ToolKind::Read),
        (r#"(?i)Writing\s+(?:to\s+)?["']?([^"'\n]+)["']?"#, ToolKind::Write),
        (r#"(?i)Editing\s+["']?([^"'\n]+)["']?"#, ToolKind::Edit),
        (r#"(?i)Running\s+(?:command\s+)?[`"']?([^`"'\n]+)[`"']?"#, ToolKind::Bash),
        (r"(?i)Bash\s*\(", ToolKind::Bash),
        (r"(?i)Searching|Grep|Glob", ToolKind::Search),
    ]
    .into_iter()
    .map(|(source, tool)| (pattern(source), tool))
    .collect()
});

/// Cleaned view of the latest chunk and of the whole window.
struct Snapshot<'a> {
    chunk: &'a str,
    window: &'a str,
}

impl Snapshot<'_> {
    fn prompt_visible(&self) -> bool {
        INPUT_PROMPT.is_match(self.chunk)
            || USER_PROMPT.is_match(self.chunk)
            || self.window.trim_end().ends_with('>')
    }
}

struct Rule {
    name: &'static str,
    detect: fn(&Snapshot<'_>) -> Option<TerminalState>,
}

const RULES: &[Rule] = &[
    Rule {
        name: "confirmation",
        detect: detect_confirmation,
    },
    Rule {
        name: "prompt",
        detect: detect_prompt,
    },
    Rule {
        name: "thinking",
        detect: detect_thinking,
    },
    Rule {
        name: "tool_use",
        detect: detect_tool,
    },
];

fn detect_confirmation(snapshot: &Snapshot<'_>) -> Option<TerminalState> {
    (snapshot.prompt_visible() && CONFIRMATION.iter().any(|re| re.is_match(snapshot.window)))
        .then_some(TerminalState::WaitingInput {
            subtype: InputKind::Confirmation,
        })
}

fn detect_prompt(snapshot: &Snapshot<'_>) -> Option<TerminalState> {
    snapshot.prompt_visible().then_some(TerminalState::WaitingInput {
        subtype: InputKind::Prompt,
    })
}

fn detect_thinking(snapshot: &Snapshot<'_>) -> Option<TerminalState> {
    THINKING
        .iter()
        .any(|re| re.is_match(snapshot.chunk))
        .then_some(TerminalState::Thinking)
}

fn detect_tool(snapshot: &Snapshot<'_>) -> Option<TerminalState> {
    TOOLS
        .iter()
        .find(|(re, _)| re.is_match(snapshot.chunk))
        .map(|&(_, tool)| TerminalState::ToolUse { tool })
}

#[derive(Debug, Default)]
pub struct OutputClassifier {
    window: Vec<u8>,
    state: TerminalState,
    last_tool: Option<ToolKind>,
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TerminalState {
        self.state
    }

    pub fn last_tool(&self) -> Option<ToolKind> {
        self.last_tool
    }

    /// Feeds one output chunk; returns the new state if it changed.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<TerminalState> {
        self.window.extend_from_slice(chunk);
        if self.window.len() > OUTPUT_WINDOW_BYTES {
            let excess = self.window.len() - OUTPUT_WINDOW_BYTES;
            self.window.drain(..excess);
        }

        let chunk_text = String::from_utf8_lossy(chunk);
        let window_text = String::from_utf8_lossy(&self.window);
        let clean_chunk = strip_escape_sequences(&chunk_text);
        let clean_window = strip_escape_sequences(&window_text);
        let snapshot = Snapshot {
            chunk: &clean_chunk,
            window: &clean_window,
        };

        let (rule, candidate) = RULES
            .iter()
            .find_map(|rule| (rule.detect)(&snapshot).map(|state| (rule.name, state)))?;

        if let TerminalState::ToolUse { tool } = candidate {
            self.last_tool = Some(tool);
        }
        if candidate == self.state {
            return None;
        }
        log::trace!("Classifier rule '{rule}' moved state {:?} -> {candidate:?}", self.state);
        self.state = candidate;
        Some(candidate)
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.state = TerminalState::Idle;
        self.last_tool = None;
    }
}

/// Per-session classifiers, created lazily on first output.
#[derive(Default)]
pub struct ClassifierRegistry {
    classifiers: DashMap<String, OutputClassifier>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&self, session_id: &str, chunk: &[u8]) -> Option<TerminalState> {
        if let Some(mut classifier) = self.classifiers.get_mut(session_id) {
            return classifier.feed(chunk);
        }
        self.classifiers
            .entry(session_id.to_string())
            .or_default()
            .feed(chunk)
    }

    pub fn state(&self, session_id: &str) -> TerminalState {
        self.classifiers
            .get(session_id)
            .map(|classifier| classifier.state())
            .unwrap_or_default()
    }

    pub fn reset(&self, session_id: &str) {
        if let Some(mut classifier) = self.classifiers.get_mut(session_id) {
            classifier.reset();
        }
    }

    pub fn remove(&self, session_id: &str) {
        self.classifiers.remove(session_id);
    }
}

/// Feeds a recorded transcript through a fresh classifier in `chunk_size` pieces.
pub fn replay(transcript: &[u8], chunk_size: usize) -> Vec<TerminalState> {
    let mut classifier = OutputClassifier::new();
    transcript
        .chunks(chunk_size.max(1))
        .filter_map(|chunk| classifier.feed(chunk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> TerminalState {
        TerminalState::WaitingInput {
            subtype: InputKind::Prompt,
        }
    }

    fn confirmation() -> TerminalState {
        TerminalState::WaitingInput {
            subtype: InputKind::Confirmation,
        }
    }

    fn transitions(chunks: &[&str]) -> Vec<TerminalState> {
        let mut classifier = OutputClassifier::new();
        chunks
            .iter()
            .filter_map(|chunk| classifier.feed(chunk.as_bytes()))
            .collect()
    }

    #[test]
    fn starts_idle() {
        let classifier = OutputClassifier::new();
        assert_eq!(classifier.state(), TerminalState::Idle);
        assert_eq!(classifier.last_tool(), None);
    }

    #[test]
    fn thinking_then_prompt() {
        assert_eq!(
            transitions(&["Thinking...\n", "> "]),
            vec![TerminalState::Thinking, prompt()]
        );
    }

    #[test]
    fn thinking_and_prompt_in_one_chunk_resolve_to_prompt() {
        assert_eq!(transitions(&["Thinking...\n> "]), vec![prompt()]);
    }

    #[test]
    fn repeated_prompt_reports_once() {
        assert_eq!(transitions(&["> ", "> "]), vec![prompt()]);
    }

    #[test]
    fn user_prompt_line_counts_as_prompt() {
        assert_eq!(transitions(&["Done.\r\nYou: \r\n"]), vec![prompt()]);
    }

    #[test]
    fn confirmation_wins_over_prompt() {
        assert_eq!(
            transitions(&["Overwrite config.toml? (y/N)\n> "]),
            vec![confirmation()]
        );
        assert_eq!(
            transitions(&["Allow? edit src/lib.rs\n", "> "]),
            vec![confirmation()]
        );
    }

    #[test]
    fn confirmation_requires_a_prompt() {
        assert_eq!(transitions(&["Press Enter to continue\n"]), vec![]);
    }

    #[test]
    fn tool_detection_follows_rule_order() {
        assert_eq!(
            transitions(&["Reading file \"src/main.rs\"\n"]),
            vec![TerminalState::ToolUse {
                tool: ToolKind::Read
            }]
        );
        assert_eq!(
            transitions(&["Running command `cargo fmt`\n"]),
            vec![TerminalState::ToolUse {
                tool: ToolKind::Bash
            }]
        );
        assert_eq!(
            transitions(&["Bash(ls -la)\n"]),
            vec![TerminalState::ToolUse {
                tool: ToolKind::Bash
            }]
        );
        assert_eq!(
            transitions(&["Grep pattern\n"]),
            vec![TerminalState::ToolUse {
                tool: ToolKind::Search
            }]
        );
    }

    #[test]
    fn tool_changes_are_transitions() {
        assert_eq!(
            transitions(&["Reading a.rs\n", "Editing a.rs\n", "Editing b.rs\n"]),
            vec![
                TerminalState::ToolUse {
                    tool: ToolKind::Read
                },
                TerminalState::ToolUse {
                    tool: ToolKind::Edit
                },
            ]
        );
    }

    #[test]
    fn last_tool_survives_state_changes() {
        let mut classifier = OutputClassifier::new();
        classifier.feed(b"Writing to out.txt\n");
        classifier.feed(b"Thinking...\n");
        assert_eq!(classifier.state(), TerminalState::Thinking);
        assert_eq!(classifier.last_tool(), Some(ToolKind::Write));
    }

    #[test]
    fn escape_sequences_do_not_hide_patterns() {
        assert_eq!(
            transitions(&["\x1b[2m\x1b[?25lThinking\x1b[0m...\n"]),
            vec![TerminalState::Thinking]
        );
        assert_eq!(
            transitions(&["\x1b[2mThinking...\x1b[0m\n", "\x1b[1m>\x1b[0m \x1b[?25h"]),
            vec![TerminalState::Thinking, prompt()]
        );
    }

    #[test]
    fn escape_sequence_split_across_chunks_is_seen_through_window() {
        assert_eq!(
            transitions(&["Thinking...\n\x1b[1", "m> "]),
            vec![TerminalState::Thinking, prompt()]
        );
    }

    #[test]
    fn unmatched_output_keeps_state() {
        assert_eq!(transitions(&["plain compiler output\n", "more text\n"]), vec![]);
    }

    #[test]
    fn window_is_bounded() {
        let mut classifier = OutputClassifier::new();
        let filler = "x".repeat(OUTPUT_WINDOW_BYTES * 3);
        classifier.feed(filler.as_bytes());
        assert_eq!(classifier.window.len(), OUTPUT_WINDOW_BYTES);
        classifier.feed(b"tail");
        assert_eq!(classifier.window.len(), OUTPUT_WINDOW_BYTES);
        assert!(classifier.window.ends_with(b"tail"));
    }

    #[test]
    fn old_confirmation_ages_out_of_window() {
        let mut classifier = OutputClassifier::new();
        classifier.feed(b"Continue? (y/n)\n> ");
        assert_eq!(classifier.state(), confirmation());
        let filler = "y".repeat(OUTPUT_WINDOW_BYTES);
        classifier.feed(filler.as_bytes());
        assert_eq!(classifier.feed(b"\n> "), Some(prompt()));
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut classifier = OutputClassifier::new();
        classifier.feed(b"Editing x\n");
        classifier.reset();
        assert_eq!(classifier.state(), TerminalState::Idle);
        assert_eq!(classifier.last_tool(), None);
        assert_eq!(
            classifier.feed(b"Editing x\n"),
            Some(TerminalState::ToolUse {
                tool: ToolKind::Edit
            })
        );
    }

    #[test]
    fn identical_input_is_deterministic() {
        let chunks = ["Reading a\n", "Thinking...\n", "Allow? (y/n)\n", "> "];
        assert_eq!(transitions(&chunks), transitions(&chunks));
    }

    #[test]
    fn registry_creates_lazily_and_isolates_sessions() {
        let registry = ClassifierRegistry::new();
        assert_eq!(registry.state("a"), TerminalState::Idle);
        assert_eq!(registry.feed("a", b"Thinking...\n"), Some(TerminalState::Thinking));
        assert_eq!(registry.feed("b", b"> "), Some(prompt()));
        assert_eq!(registry.state("a"), TerminalState::Thinking);

        registry.reset("a");
        assert_eq!(registry.state("a"), TerminalState::Idle);
        registry.remove("b");
        assert_eq!(registry.state("b"), TerminalState::Idle);
    }

    #[test]
    fn replay_feeds_transcript_in_chunks() {
        let transcript = b"Thinking...\nReading src/main.rs\n> ";
        assert_eq!(replay(transcript, transcript.len()), vec![prompt()]);
        let lines = replay(transcript, 12);
        assert_eq!(lines.first(), Some(&TerminalState::Thinking));
        assert_eq!(lines.last(), Some(&prompt()));
        assert_eq!(replay(b"", 0), vec![]);
    }

    #[test]
    fn state_serializes_with_type_tag() {
        let json = serde_json::to_value(confirmation()).unwrap();
        assert_eq!(json["type"], "waiting_input");
        assert_eq!(json["subtype"], "confirmation");
        let json = serde_json::to_value(TerminalState::ToolUse {
            tool: ToolKind::Search,
        })
        .unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["tool"], "search");
    }
}
