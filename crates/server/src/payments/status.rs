//! Provider payment statuses and the user-facing message table.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    Authorized,
    Pending,
    InProcess,
    InMediation,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    Unknown,
}

/// What a status means for the subscription it pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Approved,
    Pending,
    Rejected,
}

impl PaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" | "paid" | "completed" => PaymentStatus::Approved,
            "authorized" => PaymentStatus::Authorized,
            "pending" => PaymentStatus::Pending,
            "in_process" | "processing" => PaymentStatus::InProcess,
            "in_mediation" => PaymentStatus::InMediation,
            "rejected" | "declined" | "failed" => PaymentStatus::Rejected,
            "cancelled" | "canceled" => PaymentStatus::Cancelled,
            "refunded" => PaymentStatus::Refunded,
            "charged_back" => PaymentStatus::ChargedBack,
            _ => PaymentStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Approved => "approved",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Pending => "pending",
            PaymentStatus::InProcess => "in_process",
            PaymentStatus::InMediation => "in_mediation",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::ChargedBack => "charged_back",
            PaymentStatus::Unknown => "unknown",
        }
    }

    pub fn outcome(self) -> PaymentOutcome {
        match self {
            PaymentStatus::Approved => PaymentOutcome::Approved,
            PaymentStatus::Authorized
            | PaymentStatus::Pending
            | PaymentStatus::InProcess
            | PaymentStatus::InMediation
            | PaymentStatus::Unknown => PaymentOutcome::Pending,
            PaymentStatus::Rejected
            | PaymentStatus::Cancelled
            | PaymentStatus::Refunded
            | PaymentStatus::ChargedBack => PaymentOutcome::Rejected,
        }
    }
}

impl PaymentOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentOutcome::Approved => "approved",
            PaymentOutcome::Pending => "pending",
            PaymentOutcome::Rejected => "rejected",
        }
    }
}

const STATUS_DETAIL_MESSAGES: &[(&str, &str)] = &[
    ("accredited", "Payment approved. Your annual subscription is now active."),
    ("pending_contingency", "We are processing your payment. You will be notified as soon as it is confirmed."),
    ("pending_review_manual", "Your payment is under review. You will be notified once it is approved or rejected."),
    ("pending_waiting_payment", "We are waiting for the payment to be completed."),
    ("cc_rejected_bad_filled_card_number", "Check the card number."),
    ("cc_rejected_bad_filled_date", "Check the expiration date."),
    ("cc_rejected_bad_filled_other", "Check the card details."),
    ("cc_rejected_bad_filled_security_code", "Check the card security code."),
    ("cc_rejected_blacklist", "We could not process your payment."),
    ("cc_rejected_call_for_authorize", "You must authorize this payment with your card issuer."),
    ("cc_rejected_card_disabled", "Call your card issuer to activate your card. The phone number is on the back of your card."),
    ("cc_rejected_duplicated_payment", "You already made a payment for this amount. If you need to pay again, use another card or payment method."),
    ("cc_rejected_high_risk", "Your payment was declined. Choose another payment method."),
    ("cc_rejected_insufficient_amount", "Your card has insufficient funds."),
    ("cc_rejected_invalid_installments", "Your card does not accept the selected number of installments."),
    ("cc_rejected_max_attempts", "You reached the limit of allowed attempts. Choose another card or payment method."),
    ("cc_rejected_other_reason", "Your card issuer declined the payment."),
    ("insufficient_funds", "Your card has insufficient funds."),
    ("card_declined", "Your card issuer declined the payment."),
    ("expired_card", "Your card has expired. Use another card."),
    ("invalid_cvv", "Check the card security code."),
    ("fraud_suspected", "Your payment was declined. Choose another payment method."),
];

/// Message shown to the payer for a provider status and optional detail code.
pub fn status_message(status: PaymentStatus, status_detail: Option<&str>) -> &'static str {
    if let Some(detail) = status_detail {
        let detail = detail.trim().to_ascii_lowercase();
        if let Some((_, message)) = STATUS_DETAIL_MESSAGES.iter().find(|(code, _)| *code == detail) {
            return message;
        }
    }
    match status.outcome() {
        PaymentOutcome::Approved => "Payment approved. Your annual subscription is now active.",
        PaymentOutcome::Pending => "Your payment is being processed. Your subscription will activate once it is confirmed.",
        PaymentOutcome::Rejected => "Your payment was rejected. Try again or use another payment method.",
    }
}
