use parking_lot::Mutex;
use std::sync::Arc;

// Chaque map partagée a un seul writer (sampler ou coordinateur) ; les
// handlers HTTP ne font que lire via ce verrou.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
