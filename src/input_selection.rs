use crate::types::{Amount, Utxo};
use crate::WalletError;

#[derive(Debug, Clone)]
pub struct SelectedInputs {
    pub inputs: Vec<Utxo>,
    pub total_amount: Amount,
}

impl SelectedInputs {
    pub fn ids(&self) -> Vec<u64> {
        self.inputs.iter().map(|u| u.id).collect()
    }

    pub fn change(&self, target: Amount) -> Amount {
        self.total_amount.saturating_sub(target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSelectionError {
    InsufficientFunds { available: Amount, required: Amount },
    NoOutputsAvailable,
}

impl std::fmt::Display for InputSelectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientFunds { available, required } => {
                write!(f, "insufficient funds: need {}, have {}", required, available)
            }
            Self::NoOutputsAvailable => write!(f, "no outputs available"),
        }
    }
}

impl std::error::Error for InputSelectionError {}

impl From<InputSelectionError> for WalletError {
    fn from(err: InputSelectionError) -> Self {
        match err {
            InputSelectionError::InsufficientFunds { available, required } => {
                WalletError::InsufficientFunds {
                    needed: required,
                    available,
                }
            }
            InputSelectionError::NoOutputsAvailable => WalletError::InsufficientFunds {
                needed: 0,
                available: 0,
            },
        }
    }
}

/// Picks spendable outputs covering `target_amount`, largest first so the
/// number of inputs stays small. Ties keep the wallet's insertion order.
pub fn select_inputs(
    utxos: &[Utxo],
    target_amount: Amount,
) -> Result<SelectedInputs, InputSelectionError> {
    let mut available: Vec<&Utxo> = utxos.iter().filter(|u| u.is_spendable()).collect();
    if available.is_empty() {
        return Err(InputSelectionError::NoOutputsAvailable);
    }

    // stable sort keeps insertion order between equal amounts
    available.sort_by(|a, b| b.amount.cmp(&a.amount));

    let mut selected: Vec<Utxo> = Vec::new();
    let mut total: Amount = 0;
    for utxo in available {
        selected.push(utxo.clone());
        total = total.saturating_add(utxo.amount);

        if total >= target_amount {
            return Ok(SelectedInputs {
                inputs: selected,
                total_amount: total,
            });
        }
    }

    Err(InputSelectionError::InsufficientFunds {
        available: total,
        required: target_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyType, UtxoStatus};

    fn make_utxo(id: u64, amount: Amount, status: UtxoStatus) -> Utxo {
        Utxo {
            id,
            amount,
            status,
            create_height: 1,
            maturity: 1,
            key_type: KeyType::Regular,
            confirm_height: 1,
            confirm_hash: [0u8; 32],
            lock_height: 0,
            create_tx_id: None,
            spend_tx_id: None,
        }
    }

    #[test]
    fn test_largest_first() {
        let utxos = vec![
            make_utxo(1, 10, UtxoStatus::Unspent),
            make_utxo(2, 50, UtxoStatus::Unspent),
            make_utxo(3, 30, UtxoStatus::Unspent),
        ];

        let selected = select_inputs(&utxos, 60).unwrap();
        assert_eq!(selected.ids(), vec![2, 3]);
        assert_eq!(selected.total_amount, 80);
        assert_eq!(selected.change(60), 20);
    }

    #[test]
    fn test_skips_unspendable() {
        let utxos = vec![
            make_utxo(1, 100, UtxoStatus::Locked),
            make_utxo(2, 100, UtxoStatus::Maturing),
            make_utxo(3, 5, UtxoStatus::Unspent),
        ];

        let err = select_inputs(&utxos, 50).unwrap_err();
        assert_eq!(
            err,
            InputSelectionError::InsufficientFunds {
                available: 5,
                required: 50
            }
        );
    }

    #[test]
    fn test_no_outputs() {
        let utxos = vec![make_utxo(1, 100, UtxoStatus::Spent)];
        assert_eq!(
            select_inputs(&utxos, 1).unwrap_err(),
            InputSelectionError::NoOutputsAvailable
        );
    }

    #[test]
    fn test_equal_amounts_keep_wallet_order() {
        let utxos = vec![
            make_utxo(4, 20, UtxoStatus::Unspent),
            make_utxo(7, 20, UtxoStatus::Unspent),
        ];
        assert_eq!(select_inputs(&utxos, 15).unwrap().ids(), vec![4]);
    }

    #[test]
    fn test_maps_to_wallet_error() {
        let err: WalletError = InputSelectionError::InsufficientFunds {
            available: 3,
            required: 9,
        }
        .into();
        assert_eq!(
            err,
            WalletError::InsufficientFunds {
                needed: 9,
                available: 3
            }
        );
    }
}
