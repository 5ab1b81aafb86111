//! Per-card health tracking.
//!
//! Flows record the outcome of every card conversation here; the manager
//! app and the lifecycle flows consult it to decide whether a card set is
//! trustworthy or needs migration.

use crate::apdu::StatusWord;

/// Applet-reported data health, refreshed on every select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataHealth {
    #[default]
    Unknown,
    Ok,
    Corrupt,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CardHealth {
    pub taps: u32,
    pub failures: u32,
    pub consecutive_failures: u32,
    pub last_status: Option<StatusWord>,
    pub data_health: DataHealth,
}

/// Health table indexed by card slot (1..=4).
#[derive(Debug, Clone, Copy, Default)]
pub struct CardHealthTable {
    cards: [CardHealth; 4],
}

impl CardHealthTable {
    pub fn get(&self, card_number: u8) -> &CardHealth {
        &self.cards[(card_number - 1) as usize]
    }

    pub fn record_success(&mut self, card_number: u8, status: StatusWord) {
        let card = &mut self.cards[(card_number - 1) as usize];
        card.taps += 1;
        card.consecutive_failures = 0;
        card.last_status = Some(status);
        card.data_health = DataHealth::Ok;
    }

    pub fn record_failure(&mut self, card_number: u8, status: Option<StatusWord>) {
        let card = &mut self.cards[(card_number - 1) as usize];
        card.taps += 1;
        card.failures += 1;
        card.consecutive_failures += 1;
        card.last_status = status;
        if status == Some(StatusWord::FILE_INVALID) {
            card.data_health = DataHealth::Corrupt;
        }
    }

    /// A card that keeps failing is reported for migration.
    pub fn needs_attention(&self, card_number: u8) -> bool {
        let card = self.get(card_number);
        card.data_health == DataHealth::Corrupt || card.consecutive_failures >= 3
    }
}
