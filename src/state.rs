use crate::gateway::CheckoutService;
use crate::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub checkout: CheckoutService,
}
