//! Dormand-Prince 5(4) Butcher tableau and step-control constants.

/// Number of stages.
pub const STAGES: usize = 7;

/// Order of the propagating (5th-order) solution.
pub const STEPPER_ORDER: i32 = 5;

/// Safety factor applied to every timestep adjustment.
pub const SAFETY: f64 = 0.9;

/// Largest allowed shrink factor on rejection.
pub const MIN_FACTOR: f64 = 0.2;

/// Largest allowed growth factor on acceptance.
pub const MAX_FACTOR: f64 = 5.0;

/// Stage coupling coefficients (strictly lower triangular). Row 6 equals
/// the 5th-order weights `B`, which is what makes the scheme FSAL.
pub const A: [[f64; STAGES]; STAGES] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
        0.0,
    ],
];

/// Stage nodes.
pub const C: [f64; STAGES] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

/// 5th-order solution weights.
pub const B: [f64; STAGES] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
    0.0,
];

/// Error coefficients `e_i = b_i - b̂_i` against the embedded 4th-order
/// weights.
pub const E: [f64; STAGES] = [
    35.0 / 384.0 - 5179.0 / 57600.0,
    0.0,
    500.0 / 1113.0 - 7571.0 / 16695.0,
    125.0 / 192.0 - 393.0 / 640.0,
    -2187.0 / 6784.0 + 92097.0 / 339200.0,
    11.0 / 84.0 - 187.0 / 2100.0,
    -1.0 / 40.0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_sum_to_nodes() {
        for i in 0..STAGES {
            let row_sum: f64 = A[i].iter().sum();
            assert!(
                (row_sum - C[i]).abs() < 1e-14,
                "row {} sums to {} but c = {}",
                i,
                row_sum,
                C[i]
            );
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let b_sum: f64 = B.iter().sum();
        assert!((b_sum - 1.0).abs() < 1e-14);
    }

    #[test]
    fn error_coefficients_sum_to_zero() {
        // B and B̂ both sum to one, so their difference must vanish
        let e_sum: f64 = E.iter().sum();
        assert!(e_sum.abs() < 1e-14);
    }

    #[test]
    fn last_row_equals_weights() {
        for i in 0..STAGES {
            assert_eq!(A[STAGES - 1][i], B[i]);
        }
    }
}
