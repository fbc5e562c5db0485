// Vocabulary: the sorted set of distinct tokens and its index mapping.
//
// Tokens are ordered by their string form using plain byte comparison, so
// "0.4.7" sorts before "A4" and "C#5" before "C5". The order carries no
// musical meaning but it fixes the index of every token, which the
// normalized training inputs and the generated outputs both depend on.
//
// The vocabulary is saved as a JSON array of token strings next to the
// trained models; generation reloads it to decode the generator's output.

use crate::error::PipelineError;
use crate::token::Token;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl From<Vec<String>> for Vocabulary {
    fn from(mut names: Vec<String>) -> Self {
        names.sort();
        names.dedup();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.names
    }
}

impl Vocabulary {
    /// Distinct tokens of `tokens`, sorted by string.
    pub fn build(tokens: &[Token]) -> Self {
        let names: BTreeSet<String> = tokens.iter().map(Token::to_string).collect();
        Self::from(names.into_iter().collect::<Vec<_>>())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, token: &Token) -> Option<usize> {
        self.index.get(&token.to_string()).copied()
    }

    pub fn token_at(&self, index: usize) -> Option<Token> {
        // Names come from `Token::to_string` or a validated file, so they
        // always parse.
        self.names.get(index).and_then(|name| name.parse().ok())
    }

    /// The token at `index`, or `default` when the index is outside the
    /// vocabulary.
    pub fn token_or(&self, index: i64, default: &Token) -> Token {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.token_at(i))
            .unwrap_or_else(|| default.clone())
    }

    /// Index every token. Tokens absent from the vocabulary are an error
    /// naming the token.
    pub fn encode(&self, tokens: &[Token]) -> Result<Vec<usize>, PipelineError> {
        tokens
            .iter()
            .map(|t| {
                self.index_of(t).ok_or_else(|| {
                    PipelineError::Config(format!("token {t} is not in the vocabulary"))
                })
            })
            .collect()
    }

    /// Token strings in index order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self).map_err(PipelineError::json(path))?;
        std::fs::write(path, json).map_err(PipelineError::io(path))
    }

    /// Load a saved vocabulary. Every entry must be a valid token.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let data = std::fs::read_to_string(path).map_err(PipelineError::io(path))?;
        let vocab: Vocabulary = serde_json::from_str(&data).map_err(PipelineError::json(path))?;
        for name in vocab.iter() {
            name.parse::<Token>()?;
        }
        Ok(vocab)
    }
}
