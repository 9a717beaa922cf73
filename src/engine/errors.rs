use super::types::Chips;

/// Domain errors. The `Display` rendering of each variant is the exact
/// message surfaced to clients in `error` envelopes.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("invalid_json")]
    InvalidJson,
    #[error("invalid_payload")]
    InvalidPayload,
    #[error("unknown_type")]
    UnknownType,
    #[error("room_not_found")]
    RoomNotFound,
    #[error("invalid_password")]
    InvalidPassword,
    #[error("invalid_session")]
    InvalidSession,
    #[error("player_not_found")]
    PlayerNotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("invalid_target")]
    InvalidTarget,
    #[error("invalid_bankroll")]
    InvalidBankroll,
    #[error("invalid_bet")]
    InvalidBet,
    #[error("invalid_bank_amount")]
    InvalidBankAmount,
    #[error("insufficient_funds")]
    InsufficientFunds,
    #[error("insufficient_bank")]
    InsufficientBank,
    #[error("bank_empty")]
    BankEmpty,
    #[error("bank_locked")]
    BankLocked,
    #[error("banker_deciding")]
    BankerDeciding,
    #[error("bank_not_in_decision")]
    BankNotInDecision,
    #[error("bank_limit:{0}")]
    BankLimit(Chips),
    #[error("deck_empty")]
    DeckEmpty,
    #[error("round_not_found")]
    RoundNotFound,
    #[error("round_terminated")]
    RoundTerminated,
    #[error("turn_not_found")]
    TurnNotFound,
    #[error("rename_blocked")]
    RenameBlocked,
    #[error("buyin_blocked")]
    BuyinBlocked,
    #[error("request_not_found")]
    RequestNotFound,
    #[error("not_enough_players")]
    NotEnoughPlayers,
    /// Free-form validation message (room-id checks and the like).
    #[error("{0}")]
    Validation(String),
}

impl GameError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
