//! Prozessweiter Id-Generator
//!
//! Ein einzelner atomarer Zaehler. Wird beim Start einmal erzeugt und per
//! `Arc` an Registry und Matchmaking weitergereicht.

use std::sync::atomic::{AtomicI64, Ordering};

/// Liefert streng monoton steigende Ids ab 1
#[derive(Debug)]
pub struct IdGenerator {
    letzte: AtomicI64,
}

impl IdGenerator {
    /// Erstellt einen Generator, dessen erste Id 1 ist
    pub fn neu() -> Self {
        Self::ab(0)
    }

    /// Erstellt einen Generator, dessen erste Id `start + 1` ist
    pub fn ab(start: i64) -> Self {
        Self {
            letzte: AtomicI64::new(start),
        }
    }

    /// Naechste Id; wiederholt sich innerhalb der Prozesslaufzeit nie
    pub fn naechste(&self) -> i64 {
        self.letzte.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Zuletzt vergebene Id (0 wenn noch keine vergeben wurde)
    pub fn aktuell(&self) -> i64 {
        self.letzte.load(Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::neu()
    }
}
