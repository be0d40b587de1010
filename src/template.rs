//! Single-pass `${name}` template resolver with caching
//!
//! Templates appear in query text, markdown text and condition fields.
//! Each template is tokenized once and the token list cached, so repeated
//! resolution during a run (and across runs of the same definition) never
//! re-parses.

use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::binding::Scope;
use crate::error::WorkflowError;

/// Token representing a parsed template fragment
#[derive(Debug, Clone)]
pub enum Token {
    /// Literal text (range into the original string)
    Literal(Range<usize>),
    /// Variable reference: `${name}`
    Var(String),
}

/// Template resolver with caching
pub struct TemplateResolver {
    cache: DashMap<String, Arc<Vec<Token>>>,
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateResolver {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Parse a template into tokens (with caching)
    pub fn tokenize(&self, template: &str) -> Arc<Vec<Token>> {
        if let Some(cached) = self.cache.get(template) {
            return Arc::clone(&cached);
        }

        let mut tokens = Vec::new();
        let mut literal_start = 0;
        let mut chars = template.char_indices().peekable();

        while let Some((i, ch)) = chars.next() {
            if ch != '$' || chars.peek().map(|(_, c)| *c) != Some('{') {
                continue;
            }
            // Find the closing brace; an unterminated `${` stays literal
            let Some(end) = template[i + 2..].find('}').map(|o| i + 2 + o) else {
                break;
            };
            let name = &template[i + 2..end];
            if name.is_empty() {
                continue;
            }
            if i > literal_start {
                tokens.push(Token::Literal(literal_start..i));
            }
            tokens.push(Token::Var(name.to_string()));
            literal_start = end + 1;
            // Advance past the reference we just consumed
            while chars.peek().is_some_and(|(j, _)| *j < end + 1) {
                chars.next();
            }
        }

        if literal_start < template.len() {
            tokens.push(Token::Literal(literal_start..template.len()));
        }

        let tokens = Arc::new(tokens);
        self.cache.insert(template.to_string(), tokens.clone());
        tokens
    }

    /// Substitute every `${name}` using the nearest enclosing declaration.
    ///
    /// Fails on the first reference with no visible declaration; partial
    /// substitution is never produced.
    pub fn resolve(&self, template: &str, scope: &Scope) -> Result<String, WorkflowError> {
        let tokens = self.tokenize(template);

        let mut result = String::with_capacity(template.len());
        for token in tokens.iter() {
            match token {
                Token::Literal(range) => result.push_str(&template[range.clone()]),
                Token::Var(name) => match scope.lookup(name) {
                    Some(value) => result.push_str(&value),
                    None => {
                        return Err(WorkflowError::UnresolvedVariable { name: name.clone() })
                    }
                },
            }
        }

        Ok(result)
    }

    /// Names of every variable the template references, in order of appearance
    pub fn referenced_vars(&self, template: &str) -> Vec<String> {
        self.tokenize(template)
            .iter()
            .filter_map(|t| match t {
                Token::Var(name) => Some(name.clone()),
                Token::Literal(_) => None,
            })
            .collect()
    }
}

/// Global template resolver instance
pub static TEMPLATE_RESOLVER: Lazy<TemplateResolver> = Lazy::new(TemplateResolver::new);

/// Convenience function for resolving templates
pub fn resolve(template: &str, scope: &Scope) -> Result<String, WorkflowError> {
    TEMPLATE_RESOLVER.resolve(template, scope)
}

/// Convenience function for reference scanning
pub fn referenced_vars(template: &str) -> Vec<String> {
    TEMPLATE_RESOLVER.referenced_vars(template)
}
