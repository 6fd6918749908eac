//! Raw account events as exported by the exchange.

use crate::domain::{AccountScope, Coin, Decimal, RecordKind, UtcTime};
use serde::{Deserialize, Serialize};

/// How an event kind translates into a ledger record when exported as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMapping {
    /// Not reported at all.
    Ignore,
    /// Credit/Deposit when the change is positive, Debit/Withdrawal otherwise.
    DecideByAmount,
    Fixed(RecordKind),
}

/// Operation kinds found in the exchange transaction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    FiatDeposit,
    TransactionFee,
    TransactionBuy,
    TransactionSpend,
    CashbackVoucher,
    AirdropAssets,
    SimpleEarnFlexibleInterest,
    SimpleEarnFlexibleRealTimeAprInterest,
    SimpleEarnFlexibleSubscription,
    SimpleEarnFlexibleRedemption,
    TransferAccount,
    CrossMarginLiquidationSmallAssetTakeover,
    FundRecovery,
    Withdraw,
    IsolatedMarginLiquidationFee,
    SimpleEarnLockedSubscription,
    SimpleEarnLockedRewards,
    CashVoucher,
    TransactionRevenue,
    TransactionSold,
    Eth2Staking,
    Eth2StakingRewards,
    BinanceConvert,
    Deposit,
    SmallAssetsExchangeBnb,
    Eth2StakingWithdrawals,
    BethToWbethWrapping,
    MarginLoan,
    MarginRepayment,
    IsolatedMarginLoan,
    IsolatedMarginRepayment,
    BnbFeeDeduction,
    Buy,
    Fee,
    Distribution,
}

impl EventKind {
    pub const ALL: [EventKind; 35] = [
        EventKind::FiatDeposit,
        EventKind::TransactionFee,
        EventKind::TransactionBuy,
        EventKind::TransactionSpend,
        EventKind::CashbackVoucher,
        EventKind::AirdropAssets,
        EventKind::SimpleEarnFlexibleInterest,
        EventKind::SimpleEarnFlexibleRealTimeAprInterest,
        EventKind::SimpleEarnFlexibleSubscription,
        EventKind::SimpleEarnFlexibleRedemption,
        EventKind::TransferAccount,
        EventKind::CrossMarginLiquidationSmallAssetTakeover,
        EventKind::FundRecovery,
        EventKind::Withdraw,
        EventKind::IsolatedMarginLiquidationFee,
        EventKind::SimpleEarnLockedSubscription,
        EventKind::SimpleEarnLockedRewards,
        EventKind::CashVoucher,
        EventKind::TransactionRevenue,
        EventKind::TransactionSold,
        EventKind::Eth2Staking,
        EventKind::Eth2StakingRewards,
        EventKind::BinanceConvert,
        EventKind::Deposit,
        EventKind::SmallAssetsExchangeBnb,
        EventKind::Eth2StakingWithdrawals,
        EventKind::BethToWbethWrapping,
        EventKind::MarginLoan,
        EventKind::MarginRepayment,
        EventKind::IsolatedMarginLoan,
        EventKind::IsolatedMarginRepayment,
        EventKind::BnbFeeDeduction,
        EventKind::Buy,
        EventKind::Fee,
        EventKind::Distribution,
    ];

    /// The `Operation` column value of the export.
    pub fn display_name(&self) -> &'static str {
        match self {
            EventKind::FiatDeposit => "Fiat Deposit",
            EventKind::TransactionFee => "Transaction Fee",
            EventKind::TransactionBuy => "Transaction Buy",
            EventKind::TransactionSpend => "Transaction Spend",
            EventKind::CashbackVoucher => "Cashback Voucher",
            EventKind::AirdropAssets => "Airdrop Assets",
            EventKind::SimpleEarnFlexibleInterest => "Simple Earn Flexible Interest",
            EventKind::SimpleEarnFlexibleRealTimeAprInterest => {
                "Simple Earn Flexible realTimeApr Interest"
            }
            EventKind::SimpleEarnFlexibleSubscription => "Simple Earn Flexible Subscription",
            EventKind::SimpleEarnFlexibleRedemption => "Simple Earn Flexible Redemption",
            EventKind::TransferAccount => {
                "Transfer Between Main Account/Futures and Margin Account"
            }
            EventKind::CrossMarginLiquidationSmallAssetTakeover => {
                "Cross Margin Liquidation - Small Assets Takeover"
            }
            EventKind::FundRecovery => "Fund Recovery",
            EventKind::Withdraw => "Withdraw",
            EventKind::IsolatedMarginLiquidationFee => "Isolated Margin Liquidation - Fee",
            EventKind::SimpleEarnLockedSubscription => "Simple Earn Locked Subscription",
            EventKind::SimpleEarnLockedRewards => "Simple Earn Locked Rewards",
            EventKind::CashVoucher => "Cash Voucher",
            EventKind::TransactionRevenue => "Transaction Revenue",
            EventKind::TransactionSold => "Transaction Sold",
            EventKind::Eth2Staking => "ETH 2.0 Staking",
            EventKind::Eth2StakingRewards => "ETH 2.0 Staking Rewards",
            EventKind::BinanceConvert => "Binance Convert",
            EventKind::Deposit => "Deposit",
            EventKind::SmallAssetsExchangeBnb => "Small Assets Exchange BNB",
            EventKind::Eth2StakingWithdrawals => "ETH 2.0 Staking Withdrawals",
            EventKind::BethToWbethWrapping => "BETH to WBETH Wrapping",
            EventKind::MarginLoan => "Margin Loan",
            EventKind::MarginRepayment => "Margin Repayment",
            EventKind::IsolatedMarginLoan => "Isolated Margin Loan",
            EventKind::IsolatedMarginRepayment => "Isolated Margin Repayment",
            EventKind::BnbFeeDeduction => "BNB Fee Deduction",
            EventKind::Buy => "Buy",
            EventKind::Fee => "Fee",
            EventKind::Distribution => "Distribution",
        }
    }

    /// Case-insensitive lookup by export display name.
    pub fn from_display_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.display_name().eq_ignore_ascii_case(name))
    }

    pub fn ledger_mapping(&self) -> LedgerMapping {
        use LedgerMapping::{DecideByAmount, Fixed, Ignore};
        match self {
            EventKind::FiatDeposit | EventKind::Deposit => Fixed(RecordKind::Deposit),
            EventKind::TransactionFee
            | EventKind::IsolatedMarginLiquidationFee
            | EventKind::Fee => Fixed(RecordKind::ExchangeFee),
            EventKind::TransactionBuy
            | EventKind::TransactionSpend
            | EventKind::CrossMarginLiquidationSmallAssetTakeover
            | EventKind::Eth2Staking
            | EventKind::BinanceConvert
            | EventKind::SmallAssetsExchangeBnb
            | EventKind::Eth2StakingWithdrawals
            | EventKind::BethToWbethWrapping
            | EventKind::BnbFeeDeduction
            | EventKind::Buy => DecideByAmount,
            EventKind::CashbackVoucher
            | EventKind::SimpleEarnFlexibleInterest
            | EventKind::SimpleEarnFlexibleRealTimeAprInterest
            | EventKind::SimpleEarnLockedRewards
            | EventKind::Eth2StakingRewards => Fixed(RecordKind::Earn),
            EventKind::AirdropAssets | EventKind::CashVoucher | EventKind::Distribution => {
                Fixed(RecordKind::Airdrop)
            }
            EventKind::SimpleEarnFlexibleSubscription
            | EventKind::SimpleEarnFlexibleRedemption
            | EventKind::SimpleEarnLockedSubscription
            | EventKind::TransferAccount => Ignore,
            EventKind::FundRecovery
            | EventKind::TransactionSold
            | EventKind::MarginRepayment
            | EventKind::IsolatedMarginRepayment => Fixed(RecordKind::Debit),
            EventKind::Withdraw => Fixed(RecordKind::Withdrawal),
            EventKind::TransactionRevenue
            | EventKind::MarginLoan
            | EventKind::IsolatedMarginLoan => Fixed(RecordKind::Credit),
        }
    }

    pub fn is_loan(&self) -> bool {
        matches!(self, EventKind::MarginLoan | EventKind::IsolatedMarginLoan)
    }

    pub fn is_repayment(&self) -> bool {
        matches!(
            self,
            EventKind::MarginRepayment | EventKind::IsolatedMarginRepayment
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One row of the exchange transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub user_id: String,
    pub time: UtcTime,
    pub scope: AccountScope,
    pub kind: EventKind,
    pub coin: Coin,
    /// Signed balance change: positive adds to the wallet.
    pub change: Decimal,
    pub note: String,
}

impl RawEvent {
    pub fn new(
        time: UtcTime,
        scope: AccountScope,
        kind: EventKind,
        coin: Coin,
        change: Decimal,
    ) -> Self {
        Self {
            user_id: String::new(),
            time,
            scope,
            kind,
            coin,
            change,
            note: String::new(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn is_margin_scoped(&self) -> bool {
        self.scope.is_margin()
    }

    pub fn is_transfer_in(&self) -> bool {
        self.kind == EventKind::TransferAccount && self.change.is_positive()
    }

    pub fn to_readable_string(&self) -> String {
        format!(
            "{} {} due to: {} on date: {}",
            self.change, self.coin, self.kind, self.time
        )
    }
}
