//! Conversation-related types.

use std::fmt::{self, Display, Formatter};
use std::ops::Index;

use parley_model::ModelMessage;
use serde::{Deserialize, Serialize};

/// Who authored a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person chatting.
    User,
    /// The model, or a placeholder recorded in its place.
    Assistant,
}

/// One message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    /// Creates a user turn.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant turn.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Returns the author of this turn.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text of this turn.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    pub(crate) fn to_model_message(&self) -> ModelMessage {
        match self.role {
            Role::User => ModelMessage::User(self.content.clone()),
            Role::Assistant => ModelMessage::Assistant(self.content.clone()),
        }
    }
}

/// The ordered history of a conversation.
///
/// Turns alternate strictly between user and assistant, starting with the
/// user. Only a session can extend or edit a transcript, so every value
/// obtained from a session or a store keeps that shape; a trailing user turn
/// only exists while a request is in flight.
///
/// Serialized as a plain array of `{"role": ..., "content": ...}` objects.
/// Deserializing checks the alternation and rejects transcripts that end
/// with an unanswered user turn.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Turn>", try_from = "Vec<Turn>")]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Builds a transcript from complete exchanges.
    pub fn from_turns(turns: Vec<Turn>) -> Result<Self, InvalidTranscript> {
        if let Some((index, turn)) = turns
            .iter()
            .enumerate()
            .find(|(index, turn)| turn.role != expected_role(*index))
        {
            return Err(InvalidTranscript::UnexpectedRole {
                index,
                role: turn.role,
            });
        }
        if turns.len() % 2 != 0 {
            return Err(InvalidTranscript::Unanswered);
        }
        Ok(Self { turns })
    }

    /// Returns the number of turns.
    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns `true` if there are no turns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the turn at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    /// Returns the most recent turn.
    #[inline]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Returns all turns, oldest first.
    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Iterates over the turns, oldest first.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// Checks that every user turn has been answered.
    pub fn check_complete(&self) -> Result<(), InvalidTranscript> {
        if self.turns.len() % 2 == 0 {
            Ok(())
        } else {
            Err(InvalidTranscript::Unanswered)
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, turn: Turn) {
        debug_assert_eq!(turn.role, expected_role(self.turns.len()));
        self.turns.push(turn);
    }

    #[inline]
    pub(crate) fn set_content(&mut self, index: usize, content: String) {
        if let Some(turn) = self.turns.get_mut(index) {
            turn.content = content;
        }
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }
}

#[inline]
fn expected_role(index: usize) -> Role {
    if index % 2 == 0 {
        Role::User
    } else {
        Role::Assistant
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

impl Index<usize> for Transcript {
    type Output = Turn;

    #[inline]
    fn index(&self, index: usize) -> &Turn {
        &self.turns[index]
    }
}

impl From<Transcript> for Vec<Turn> {
    #[inline]
    fn from(transcript: Transcript) -> Self {
        transcript.turns
    }
}

impl TryFrom<Vec<Turn>> for Transcript {
    type Error = InvalidTranscript;

    #[inline]
    fn try_from(turns: Vec<Turn>) -> Result<Self, Self::Error> {
        Self::from_turns(turns)
    }
}

/// The reason a list of turns is not a valid transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidTranscript {
    /// The turn at `index` breaks the user/assistant alternation.
    UnexpectedRole {
        /// Position of the offending turn.
        index: usize,
        /// Role found at that position.
        role: Role,
    },
    /// The last user turn has no assistant turn after it.
    Unanswered,
}

impl Display for InvalidTranscript {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedRole { index, role } => {
                write!(f, "unexpected {role:?} turn at position {index}")
            }
            Self::Unanswered => f.write_str("last user turn is unanswered"),
        }
    }
}

impl std::error::Error for InvalidTranscript {}
