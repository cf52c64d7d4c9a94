//! Pre-flight input validation
//!
//! Every check here runs before a request is built; a failure is a
//! `ValidationError` naming the field, the reason, and the offending value.
use crate::errors::ValidationError;

/// Default payload ceiling enforced by the service for most platforms
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Longest tag the service accepts
pub const MAX_TAG_LENGTH: usize = 120;

/// Most tags a single boolean tag expression may reference
pub const MAX_TAGS_PER_EXPRESSION: usize = 20;

const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Device handles are opaque tokens; they only have to be present and contain no whitespace.
pub fn validate_device_handle(field: &str, handle: &str) -> Result<(), ValidationError> {
    if handle.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty", handle));
    }
    if handle.chars().any(char::is_whitespace) {
        return Err(ValidationError::new(field, "must not contain whitespace", handle));
    }
    Ok(())
}

/// Registration and scheduled-notification ids end up as URL path segments.
pub fn validate_identifier(field: &str, id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::new(field, "must not be empty", id));
    }
    if id.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", MAX_IDENTIFIER_LENGTH),
            id,
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ValidationError::new(
            field,
            "may only contain letters, digits, '-', '_' and '.'",
            id,
        ));
    }
    Ok(())
}

pub fn validate_payload_size(
    field: &str,
    payload: &[u8],
    max_bytes: usize,
) -> Result<(), ValidationError> {
    if payload.is_empty() {
        return Err(ValidationError::new(field, "must not be empty", "0 bytes"));
    }
    if payload.len() > max_bytes {
        return Err(ValidationError::new(
            field,
            format!("exceeds maximum size of {} bytes", max_bytes),
            format!("{} bytes", payload.len()),
        ));
    }
    Ok(())
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '#' | '.' | ':' | '-')
}

fn check_tag(field: &str, expression: &str, tag: &str) -> Result<(), ValidationError> {
    if tag.is_empty() {
        return Err(ValidationError::new(field, "contains an empty tag", expression));
    }
    if tag.len() > MAX_TAG_LENGTH {
        return Err(ValidationError::new(
            field,
            format!("tag '{}' is longer than {} characters", tag, MAX_TAG_LENGTH),
            expression,
        ));
    }
    if let Some(bad) = tag.chars().find(|c| !is_tag_char(*c)) {
        return Err(ValidationError::new(
            field,
            format!("tag '{}' contains invalid character '{}'", tag, bad),
            expression,
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Tag(&'a str),
    And,
    Or,
    Not,
    Open,
    Close,
}

fn tokenize<'a>(field: &str, expression: &'a str) -> Result<Vec<Token<'a>>, ValidationError> {
    let mut tokens = Vec::new();
    let bytes = expression.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' => i += 1,
            b'(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            b'&' if bytes.get(i + 1) == Some(&b'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            b'|' if bytes.get(i + 1) == Some(&b'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            _ => {
                let start = i;
                while i < bytes.len()
                    && !matches!(bytes[i], b' ' | b'\t' | b'(' | b')' | b'!' | b'&' | b'|')
                {
                    i += 1;
                }
                if start == i {
                    return Err(ValidationError::new(
                        field,
                        format!("unexpected character at position {}", start),
                        expression,
                    ));
                }
                let tag = &expression[start..i];
                check_tag(field, expression, tag)?;
                tokens.push(Token::Tag(tag));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent over `or := and ('||' and)*`, `and := unary ('&&' unary)*`,
/// `unary := '!' unary | '(' or ')' | tag`
struct Parser<'a, 'f> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    field: &'f str,
    expression: &'a str,
}

impl<'a, 'f> Parser<'a, 'f> {
    fn error(&self, message: &str) -> ValidationError {
        ValidationError::new(self.field, message, self.expression)
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn parse_or(&mut self) -> Result<(), ValidationError> {
        self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            self.parse_and()?;
        }
        Ok(())
    }

    fn parse_and(&mut self) -> Result<(), ValidationError> {
        self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            self.parse_unary()?;
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> Result<(), ValidationError> {
        match self.peek().cloned() {
            Some(Token::Not) => {
                self.pos += 1;
                self.parse_unary()
            }
            Some(Token::Open) => {
                self.pos += 1;
                self.parse_or()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(self.error("has unbalanced parentheses"));
                }
                self.pos += 1;
                Ok(())
            }
            Some(Token::Tag(_)) => {
                self.pos += 1;
                Ok(())
            }
            Some(Token::Close) => Err(self.error("has unbalanced parentheses")),
            Some(Token::And) | Some(Token::Or) => {
                Err(self.error("has an operator without an operand"))
            }
            None => Err(self.error("ends with a dangling operator")),
        }
    }
}

/// Accepts either a comma-separated tag list (`a,b,c`) or a boolean
/// expression over tags using `&&`, `||`, `!` and parentheses.
pub fn validate_tag_expression(field: &str, expression: &str) -> Result<(), ValidationError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, "must not be empty", expression));
    }

    let is_expression = trimmed.contains(['&', '|', '!', '(', ')']);
    if !is_expression {
        for tag in trimmed.split(',') {
            check_tag(field, expression, tag.trim())?;
        }
        return Ok(());
    }

    if trimmed.contains(',') {
        return Err(ValidationError::new(
            field,
            "cannot mix a comma-separated tag list with operators",
            expression,
        ));
    }

    let tokens = tokenize(field, expression)?;
    let tag_count = tokens.iter().filter(|t| matches!(t, Token::Tag(_))).count();
    if tag_count > MAX_TAGS_PER_EXPRESSION {
        return Err(ValidationError::new(
            field,
            format!(
                "references {} tags, at most {} are allowed",
                tag_count, MAX_TAGS_PER_EXPRESSION
            ),
            expression,
        ));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        field,
        expression,
    };
    parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("has unexpected trailing tokens"));
    }
    Ok(())
}
