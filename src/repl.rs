use nu_ansi_term::{Color, Style};
use reedline::{
    Highlighter, Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus,
    StyledText, ValidationResult, Validator,
};
use std::borrow::Cow;

use crate::tokenizer::{scan, TokenType};

#[derive(Clone)]
pub struct REPLPrompt;

impl Prompt for REPLPrompt {
    fn render_prompt_left(&self) -> Cow<str> {
        Cow::Borrowed("megaladon")
    }

    fn render_prompt_right(&self) -> Cow<str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _edit_mode: PromptEditMode) -> Cow<str> {
        Cow::Borrowed("❯ ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<str> {
        Cow::Borrowed("  ... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!(
            "({}reverse-search: {}) ",
            prefix, history_search.term
        ))
    }
}

/// Holds the submission open while delimiters or a string literal are
/// unbalanced, so block bodies can be typed across lines.
pub struct REPLValidator;

impl Validator for REPLValidator {
    fn validate(&self, line: &str) -> ValidationResult {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            return ValidationResult::Complete;
        }

        if trimmed.ends_with('\\') {
            return ValidationResult::Incomplete;
        }

        let mut delimiters = Vec::new();
        let mut in_string = false;
        let mut escaped = false;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '"' if !escaped => in_string = !in_string,
                '\\' if in_string => escaped = !escaped,
                _ if in_string => {
                    escaped = false;
                    continue;
                }

                // Line comment: ignore through end of line.
                '/' if chars.peek() == Some(&'/') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }

                '{' | '(' | '[' => delimiters.push(c),
                '}' => {
                    if delimiters.pop() != Some('{') {
                        return ValidationResult::Complete;
                    }
                }
                ')' => {
                    if delimiters.pop() != Some('(') {
                        return ValidationResult::Complete;
                    }
                }
                ']' => {
                    if delimiters.pop() != Some('[') {
                        return ValidationResult::Complete;
                    }
                }

                _ => escaped = false,
            }
        }

        if in_string {
            return ValidationResult::Incomplete;
        }

        if delimiters.is_empty() {
            ValidationResult::Complete
        } else {
            ValidationResult::Incomplete
        }
    }
}

pub static KEYWORD_COLOR: Color = Color::LightBlue;
pub static LITERAL_COLOR: Color = Color::Yellow;
pub static DEFAULT_COLOR: Color = Color::White;
pub static OPERATOR_COLOR: Color = Color::DarkGray;

pub struct SyntaxHighlighter;

impl Highlighter for SyntaxHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled_text = StyledText::new();

        // Scanning never fails outright; bad input just produces fewer
        // tokens, and whatever they skipped falls through uncolored.
        let (tokens, _) = scan(line);

        let mut remaining = line;

        for token in tokens {
            if token.token_type == TokenType::Eof || token.lexeme.is_empty() {
                continue;
            }

            if let Some(pos) = remaining.find(&token.lexeme) {
                if pos > 0 {
                    styled_text
                        .push((Style::new().fg(DEFAULT_COLOR), remaining[..pos].to_string()));
                }

                let color = match &token.token_type {
                    TokenType::And
                    | TokenType::Class
                    | TokenType::Else
                    | TokenType::False
                    | TokenType::For
                    | TokenType::Func
                    | TokenType::If
                    | TokenType::Or
                    | TokenType::Print
                    | TokenType::Return
                    | TokenType::True
                    | TokenType::Var
                    | TokenType::Void
                    | TokenType::While => KEYWORD_COLOR,
                    TokenType::String(_) | TokenType::Number(_) => LITERAL_COLOR,
                    TokenType::Plus
                    | TokenType::Minus
                    | TokenType::Star
                    | TokenType::Slash
                    | TokenType::Percent
                    | TokenType::Bang
                    | TokenType::Equal
                    | TokenType::Greater
                    | TokenType::Less
                    | TokenType::BangEqual
                    | TokenType::EqualEqual
                    | TokenType::GreaterEqual
                    | TokenType::LessEqual
                    | TokenType::Semicolon
                    | TokenType::Colon
                    | TokenType::Comma
                    | TokenType::Dot => OPERATOR_COLOR,
                    _ => DEFAULT_COLOR,
                };

                styled_text.push((
                    Style::new().fg(color),
                    remaining[pos..pos + token.lexeme.len()].to_string(),
                ));
                remaining = &remaining[pos + token.lexeme.len()..];
            }
        }

        if !remaining.is_empty() {
            styled_text.push((Style::new().fg(DEFAULT_COLOR), remaining.to_string()));
        }

        styled_text
    }
}
