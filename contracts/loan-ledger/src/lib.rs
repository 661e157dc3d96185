#![no_std]
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, log, symbol_short, vec, Address, Env,
    IntoVal, InvokeError, Val, Vec,
};

// ─────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────

const PERCENT_DENOMINATOR: u128 = 100;
const MIN_REPAYMENT_CAP_PERCENT: u32 = 100; // Cap below principal makes no sense

// ─────────────────────────────────────────────────
// Data Types
// ─────────────────────────────────────────────────

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Loan {
    pub id: u64,
    pub borrower: Address,
    pub lender: Option<Address>, // Unset until the loan is funded
    pub principal: i128,
    pub revenue_share_percent: u32, // Stored and echoed only; reserved for oracle integration
    pub repayment_cap_percent: u32, // Total owed = principal * cap / 100
    pub total_repaid: i128,
    pub funded: bool,
    pub active: bool,
    pub collateral_amount: i128, // Held by the contract; zeroed exactly once
    pub start_time: u64,         // Set at funding
    pub duration: u64,           // Seconds after start_time before default is claimable
}

// ─────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoanCreatedEvent {
    pub loan_id: u64,
    pub borrower: Address,
    pub principal: i128,
    pub revenue_share_percent: u32,
    pub repayment_cap_percent: u32,
    pub duration: u64,
    pub collateral_amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoanFundedEvent {
    pub loan_id: u64,
    pub lender: Address,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoanRepaidEvent {
    pub loan_id: u64,
    pub borrower: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoanDefaultedEvent {
    pub loan_id: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollateralClaimedEvent {
    pub loan_id: u64,
    pub claimer: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoanClosedEvent {
    pub loan_id: u64,
}

// ─────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────

#[contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LedgerError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAdmin = 3,
    Paused = 4,
    ReentrantCall = 5,
    LoanNotFound = 6,
    InvalidPrincipal = 7,
    InvalidRevenueShare = 8,
    InvalidRepaymentCap = 9,
    InvalidDuration = 10,
    CollateralExceedsPrincipal = 11,
    AlreadyFunded = 12,
    SelfFundingNotAllowed = 13,
    IncorrectFundingAmount = 14,
    NotBorrower = 15,
    NotLender = 16,
    LoanNotActive = 17,
    InvalidAmount = 18,
    NotYetMatured = 19,
    AlreadyFullyRepaid = 20,
    NoCollateralToClaim = 21,
    Overflow = 22,
    TransferFailed = 23,
}

// ─────────────────────────────────────────────────
// Storage Keys
// ─────────────────────────────────────────────────

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    Token,
    Paused,
    Entered,
    NextLoanId,
    Loan(u64),
}

// ─────────────────────────────────────────────────
// Contract
// ─────────────────────────────────────────────────

#[contract]
pub struct LoanLedger;

#[contractimpl]
impl LoanLedger {
    // ─── Admin / Init ───────────────────────────────

    /// Initialize the ledger with an admin address and the settlement token.
    /// Can only be called once.
    pub fn initialize(env: Env, admin: Address, token: Address) -> Result<(), LedgerError> {
        admin.require_auth();
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(LedgerError::AlreadyInitialized);
        }
        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Token, &token);
        Ok(())
    }

    /// Toggle the global pause switch (admin only). While paused, all
    /// mutating entry points fail; reads remain available.
    pub fn set_paused(env: Env, admin: Address, paused: bool) -> Result<(), LedgerError> {
        Self::require_admin(&env, &admin)?;
        env.storage().instance().set(&DataKey::Paused, &paused);
        log!(&env, "Ledger pause set to {}", paused);
        Ok(())
    }

    pub fn is_paused(env: Env) -> bool {
        env.storage()
            .instance()
            .get(&DataKey::Paused)
            .unwrap_or(false)
    }

    // ─── Internal Helpers ───────────────────────────

    fn require_initialized(env: &Env) -> Result<(), LedgerError> {
        if !env.storage().instance().has(&DataKey::Admin) {
            return Err(LedgerError::NotInitialized);
        }
        Ok(())
    }

    fn require_not_paused(env: &Env) -> Result<(), LedgerError> {
        if Self::is_paused(env.clone()) {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    // Entered flag rejects nested mutating calls for the duration of an
    // invocation. A failed invocation rolls the flag back with the rest of
    // the state.
    fn enter(env: &Env) -> Result<(), LedgerError> {
        if env
            .storage()
            .temporary()
            .get(&DataKey::Entered)
            .unwrap_or(false)
        {
            return Err(LedgerError::ReentrantCall);
        }
        env.storage().temporary().set(&DataKey::Entered, &true);
        Ok(())
    }

    fn exit(env: &Env) {
        env.storage().temporary().remove(&DataKey::Entered);
    }

    fn get_admin(env: &Env) -> Option<Address> {
        env.storage().instance().get(&DataKey::Admin)
    }

    fn require_admin(env: &Env, caller: &Address) -> Result<(), LedgerError> {
        caller.require_auth();
        let admin = Self::get_admin(env).ok_or(LedgerError::NotAdmin)?;
        if *caller != admin {
            return Err(LedgerError::NotAdmin);
        }
        Ok(())
    }

    fn get_token(env: &Env) -> Address {
        env.storage().instance().get(&DataKey::Token).unwrap()
    }

    fn load_loan(env: &Env, loan_id: u64) -> Result<Loan, LedgerError> {
        env.storage()
            .persistent()
            .get(&DataKey::Loan(loan_id))
            .ok_or(LedgerError::LoanNotFound)
    }

    fn store_loan(env: &Env, loan: &Loan) {
        env.storage().persistent().set(&DataKey::Loan(loan.id), loan);
    }

    fn get_next_loan_id(env: &Env) -> u64 {
        env.storage()
            .instance()
            .get(&DataKey::NextLoanId)
            .unwrap_or(1u64)
    }

    fn increment_loan_id(env: &Env) -> u64 {
        let current = Self::get_next_loan_id(env);
        env.storage()
            .instance()
            .set(&DataKey::NextLoanId, &(current + 1));
        current
    }

    /// Total amount owed: principal * cap / 100, truncating toward zero.
    /// The product is range-checked at creation, so plain arithmetic is safe.
    fn required_repayment(loan: &Loan) -> i128 {
        ((loan.principal as u128) * (loan.repayment_cap_percent as u128) / PERCENT_DENOMINATOR)
            as i128
    }

    fn transfer(
        env: &Env,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: i128,
    ) -> Result<(), LedgerError> {
        let args: Vec<Val> = vec![
            env,
            from.clone().into_val(env),
            to.clone().into_val(env),
            amount.into_val(env),
        ];
        let res =
            env.try_invoke_contract::<(), InvokeError>(token, &symbol_short!("transfer"), args);
        if res.is_err() {
            return Err(LedgerError::TransferFailed);
        }
        Ok(())
    }

    // ─── Public Functions ────────────────────────────

    /// Open an unfunded loan request. `collateral_amount` (up to `principal`)
    /// is pulled from the borrower and held by the contract until full
    /// repayment or default. Returns the new loan id.
    pub fn create_loan(
        env: Env,
        borrower: Address,
        principal: i128,
        revenue_share_percent: u32,
        repayment_cap_percent: u32,
        duration: u64,
        collateral_amount: i128,
    ) -> Result<u64, LedgerError> {
        Self::require_initialized(&env)?;
        Self::require_not_paused(&env)?;
        Self::enter(&env)?;
        borrower.require_auth();

        if principal <= 0 {
            return Err(LedgerError::InvalidPrincipal);
        }
        if revenue_share_percent == 0 {
            return Err(LedgerError::InvalidRevenueShare);
        }
        if repayment_cap_percent < MIN_REPAYMENT_CAP_PERCENT {
            return Err(LedgerError::InvalidRepaymentCap);
        }
        if duration == 0 {
            return Err(LedgerError::InvalidDuration);
        }
        if collateral_amount < 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if collateral_amount > principal {
            return Err(LedgerError::CollateralExceedsPrincipal);
        }

        // Reject parameters whose repayment target cannot be represented, so
        // required_repayment stays plain arithmetic afterwards.
        let cap_product = (principal as u128)
            .checked_mul(repayment_cap_percent as u128)
            .ok_or(LedgerError::Overflow)?;
        if cap_product / PERCENT_DENOMINATOR > i128::MAX as u128 {
            return Err(LedgerError::Overflow);
        }

        let loan_id = Self::increment_loan_id(&env);
        let loan = Loan {
            id: loan_id,
            borrower: borrower.clone(),
            lender: None,
            principal,
            revenue_share_percent,
            repayment_cap_percent,
            total_repaid: 0,
            funded: false,
            active: false,
            collateral_amount,
            start_time: 0,
            duration,
        };
        Self::store_loan(&env, &loan);

        // Record committed first; a failed collateral pull reverts everything.
        if collateral_amount > 0 {
            let token = Self::get_token(&env);
            let contract_id = env.current_contract_address();
            Self::transfer(&env, &token, &borrower, &contract_id, collateral_amount)?;
        }

        env.events().publish(
            (symbol_short!("LOAN"), symbol_short!("CREATED")),
            LoanCreatedEvent {
                loan_id,
                borrower: borrower.clone(),
                principal,
                revenue_share_percent,
                repayment_cap_percent,
                duration,
                collateral_amount,
            },
        );
        log!(
            &env,
            "Loan {} created: {} principal, {} collateral",
            loan_id,
            principal,
            collateral_amount
        );
        Self::exit(&env);
        Ok(loan_id)
    }

    /// Fund an open loan with exactly its principal. The caller becomes the
    /// lender, the repayment clock starts, and the principal moves to the
    /// borrower. A loan can be funded exactly once, and never by its own
    /// borrower.
    pub fn fund_loan(
        env: Env,
        lender: Address,
        loan_id: u64,
        amount: i128,
    ) -> Result<(), LedgerError> {
        Self::require_initialized(&env)?;
        Self::require_not_paused(&env)?;
        Self::enter(&env)?;
        lender.require_auth();

        let mut loan = Self::load_loan(&env, loan_id)?;
        if loan.funded || loan.active {
            return Err(LedgerError::AlreadyFunded);
        }
        if lender == loan.borrower {
            return Err(LedgerError::SelfFundingNotAllowed);
        }
        if amount != loan.principal {
            return Err(LedgerError::IncorrectFundingAmount);
        }

        // Commit lifecycle state before settlement.
        loan.lender = Some(lender.clone());
        loan.funded = true;
        loan.active = true;
        loan.start_time = env.ledger().timestamp();
        Self::store_loan(&env, &loan);

        let token = Self::get_token(&env);
        Self::transfer(&env, &token, &lender, &loan.borrower, amount)?;

        env.events().publish(
            (symbol_short!("LOAN"), symbol_short!("FUNDED")),
            LoanFundedEvent {
                loan_id,
                lender: lender.clone(),
            },
        );
        log!(&env, "Loan {} funded by {}", loan_id, lender);
        Self::exit(&env);
        Ok(())
    }

    /// Repay part of a loan. The payment is forwarded to the lender. When
    /// cumulative repayment reaches the cap the loan closes and collateral
    /// returns to the borrower. Overpayment is permitted and not refunded.
    pub fn repay_loan(
        env: Env,
        borrower: Address,
        loan_id: u64,
        amount: i128,
    ) -> Result<(), LedgerError> {
        Self::require_initialized(&env)?;
        Self::require_not_paused(&env)?;
        Self::enter(&env)?;
        borrower.require_auth();

        let mut loan = Self::load_loan(&env, loan_id)?;
        if borrower != loan.borrower {
            return Err(LedgerError::NotBorrower);
        }
        if !loan.funded || !loan.active {
            return Err(LedgerError::LoanNotActive);
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let lender = loan.lender.clone().ok_or(LedgerError::LoanNotActive)?;

        // All bookkeeping first, then settlement.
        loan.total_repaid = loan
            .total_repaid
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        let required = Self::required_repayment(&loan);
        let mut collateral_released: i128 = 0;
        if loan.total_repaid >= required {
            loan.active = false;
            if loan.collateral_amount > 0 {
                collateral_released = loan.collateral_amount;
                loan.collateral_amount = 0;
            }
        }
        Self::store_loan(&env, &loan);

        let token = Self::get_token(&env);
        Self::transfer(&env, &token, &borrower, &lender, amount)?;
        if collateral_released > 0 {
            let contract_id = env.current_contract_address();
            Self::transfer(&env, &token, &contract_id, &borrower, collateral_released)?;
        }

        env.events().publish(
            (symbol_short!("LOAN"), symbol_short!("REPAID")),
            LoanRepaidEvent {
                loan_id,
                borrower: borrower.clone(),
                amount,
            },
        );
        if !loan.active {
            env.events().publish(
                (symbol_short!("LOAN"), symbol_short!("CLOSED")),
                LoanClosedEvent { loan_id },
            );
        }
        log!(
            &env,
            "Loan {} repaid {} ({} of {} total)",
            loan_id,
            amount,
            loan.total_repaid,
            required
        );
        Self::exit(&env);
        Ok(())
    }

    /// Claim the posted collateral on a matured, under-repaid loan. Only the
    /// lender may claim, and only strictly after `start_time + duration`.
    /// Closes the loan in default.
    pub fn claim_default(env: Env, lender: Address, loan_id: u64) -> Result<(), LedgerError> {
        Self::require_initialized(&env)?;
        Self::require_not_paused(&env)?;
        Self::enter(&env)?;
        lender.require_auth();

        let mut loan = Self::load_loan(&env, loan_id)?;
        if loan.lender != Some(lender.clone()) {
            return Err(LedgerError::NotLender);
        }
        if !loan.funded || !loan.active {
            return Err(LedgerError::LoanNotActive);
        }
        let maturity = loan
            .start_time
            .checked_add(loan.duration)
            .ok_or(LedgerError::Overflow)?;
        if env.ledger().timestamp() <= maturity {
            return Err(LedgerError::NotYetMatured);
        }
        if loan.total_repaid >= Self::required_repayment(&loan) {
            return Err(LedgerError::AlreadyFullyRepaid);
        }
        if loan.collateral_amount == 0 {
            return Err(LedgerError::NoCollateralToClaim);
        }

        loan.active = false;
        let claimed = loan.collateral_amount;
        loan.collateral_amount = 0;
        Self::store_loan(&env, &loan);

        // Fixed event order, published before the settlement transfer:
        // defaulted, then collateral claimed, then closed.
        env.events().publish(
            (symbol_short!("LOAN"), symbol_short!("DEFAULT")),
            LoanDefaultedEvent { loan_id },
        );
        env.events().publish(
            (symbol_short!("COLL"), symbol_short!("CLAIMED")),
            CollateralClaimedEvent {
                loan_id,
                claimer: lender.clone(),
                amount: claimed,
            },
        );
        env.events().publish(
            (symbol_short!("LOAN"), symbol_short!("CLOSED")),
            LoanClosedEvent { loan_id },
        );

        let token = Self::get_token(&env);
        let contract_id = env.current_contract_address();
        Self::transfer(&env, &token, &contract_id, &lender, claimed)?;

        log!(
            &env,
            "Loan {} defaulted: {} collateral claimed by {}",
            loan_id,
            claimed,
            lender
        );
        Self::exit(&env);
        Ok(())
    }

    // ─── Reads ───────────────────────────────────────

    /// Returns the full loan record, or LoanNotFound for any id outside
    /// [1, next_id).
    pub fn get_loan(env: Env, loan_id: u64) -> Result<Loan, LedgerError> {
        Self::load_loan(&env, loan_id)
    }

    /// Total amount that must be repaid before the loan closes.
    pub fn get_required_repayment(env: Env, loan_id: u64) -> Result<i128, LedgerError> {
        let loan = Self::load_loan(&env, loan_id)?;
        Ok(Self::required_repayment(&loan))
    }

    /// Number of loans ever created.
    pub fn loan_count(env: Env) -> u64 {
        Self::get_next_loan_id(&env) - 1
    }
}
