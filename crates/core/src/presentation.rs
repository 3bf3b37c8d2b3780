//! Display helpers for revealing an already complete turn bit by bit.
//!
//! Nothing here touches a session: the content is fully known before the
//! first chunk is shown.

/// Splits `content` into chunks that each end right after a run of
/// whitespace.
///
/// Concatenating the chunks yields `content` exactly, whitespace included.
///
/// ```
/// # use parley_core::presentation::reveal_chunks;
/// let chunks = reveal_chunks("Hello,  world!\nBye").collect::<Vec<_>>();
/// assert_eq!(chunks, ["Hello,  ", "world!\n", "Bye"]);
/// ```
pub fn reveal_chunks(content: &str) -> RevealChunks<'_> {
    RevealChunks { rest: content }
}

/// Iterator returned by [`reveal_chunks`].
#[derive(Clone, Debug)]
pub struct RevealChunks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for RevealChunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let word_end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let chunk_end = self.rest[word_end..]
            .find(|c: char| !c.is_whitespace())
            .map_or(self.rest.len(), |idx| word_end + idx);
        let (chunk, rest) = self.rest.split_at(chunk_end);
        self.rest = rest;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concatenation_is_lossless() {
        for content in [
            "",
            "one",
            "  leading spaces",
            "trailing spaces  ",
            "tabs\tand\nnew lines\r\n",
            "multi-byte — ünïcödé 字符",
        ] {
            let joined = reveal_chunks(content).collect::<String>();
            assert_eq!(joined, content);
        }
    }

    #[test]
    fn test_chunk_boundaries() {
        assert_eq!(reveal_chunks("").count(), 0);
        assert_eq!(
            reveal_chunks("  a b").collect::<Vec<_>>(),
            ["  ", "a ", "b"]
        );
        assert_eq!(
            reveal_chunks("a\n\nb ").collect::<Vec<_>>(),
            ["a\n\n", "b "]
        );
    }
}
