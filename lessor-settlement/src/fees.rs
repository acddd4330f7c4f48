use lessor_core::models::DamageType;

/// Tiered damage fee estimate against the held deposit: minor 10%, major
/// 50%, total loss forfeits the full deposit. Used only when the caller
/// supplies no explicit fee.
pub fn estimate_damage_fee(damage_type: DamageType, deposit_amount: i64) -> i64 {
    match damage_type {
        DamageType::Minor => deposit_amount / 10,
        DamageType::Major => deposit_amount / 2,
        DamageType::Total => deposit_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_tiers() {
        assert_eq!(estimate_damage_fee(DamageType::Minor, 1000), 100);
        assert_eq!(estimate_damage_fee(DamageType::Major, 1000), 500);
        assert_eq!(estimate_damage_fee(DamageType::Total, 1000), 1000);
    }

    #[test]
    fn test_fee_rounds_down_on_odd_deposits() {
        assert_eq!(estimate_damage_fee(DamageType::Minor, 105), 10);
        assert_eq!(estimate_damage_fee(DamageType::Major, 105), 52);
    }
}
