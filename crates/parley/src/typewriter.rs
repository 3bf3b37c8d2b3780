use std::time::Duration;

use parley_core::presentation::reveal_chunks;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tokio::time::sleep;

/// Plays a complete turn chunk by chunk with a fixed delay in between.
///
/// Purely cosmetic: the content is already recorded when it is played.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Typewriter {
    delay: Duration,
}

impl Default for Typewriter {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl Typewriter {
    /// Creates a typewriter waiting `delay` between chunks. A zero delay
    /// writes everything at once.
    #[inline]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Returns the delay between chunks.
    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Writes `content` to `out`, flushing after every chunk.
    pub async fn play<W>(&self, content: &str, out: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if self.delay.is_zero() {
            out.write_all(content.as_bytes()).await?;
            return out.flush().await;
        }

        for (idx, chunk) in reveal_chunks(content).enumerate() {
            if idx > 0 {
                sleep(self.delay).await;
            }
            out.write_all(chunk.as_bytes()).await?;
            out.flush().await?;
        }
        Ok(())
    }
}
