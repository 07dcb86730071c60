//! Regularized incomplete beta step tables.
//!
//! The `low` and `high` importance transforms read the Beta(0.2, 0.2)
//! and Beta(5, 5) CDFs from tables at 0.01 resolution. Tables are built
//! once on first use.

use std::f64::consts::PI;
use std::sync::OnceLock;

/// Table entries: x = 0.00, 0.01, ..., 1.00
pub const STEPS: usize = 101;

const CF_MAX_ITERATIONS: usize = 300;
const CF_EPSILON: f64 = 1e-14;
const CF_TINY: f64 = 1e-300;

/// Lanczos approximation, g = 7
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula
        (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let t = x + 7.5;
        let series = LANCZOS
            .iter()
            .enumerate()
            .skip(1)
            .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64));
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
    }
}

/// Continued fraction for the incomplete beta (modified Lentz)
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    let clamp = |v: f64| if v.abs() < CF_TINY { CF_TINY } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / clamp(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=CF_MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / clamp(1.0 + even * d);
        c = clamp(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / clamp(1.0 + odd * d);
        c = clamp(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < CF_EPSILON {
            break;
        }
    }
    h
}

/// Regularized incomplete beta I_x(a, b)
pub fn incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

/// Step table of a beta CDF
#[derive(Debug, Clone)]
pub struct BetaTable {
    steps: [f64; STEPS],
}

impl BetaTable {
    pub fn build(a: f64, b: f64) -> Self {
        let mut steps = [0.0; STEPS];
        for (i, step) in steps.iter_mut().enumerate() {
            *step = incomplete_beta(i as f64 / (STEPS - 1) as f64, a, b);
        }
        Self { steps }
    }

    /// Value at the step nearest to `p`
    pub fn lookup(&self, p: f64) -> f64 {
        let idx = (p.clamp(0.0, 1.0) * (STEPS - 1) as f64).round() as usize;
        self.steps[idx.min(STEPS - 1)]
    }
}

/// Beta(0.2, 0.2): pulls probabilities toward 0.5
pub fn low_table() -> &'static BetaTable {
    static LOW: OnceLock<BetaTable> = OnceLock::new();
    LOW.get_or_init(|| BetaTable::build(0.2, 0.2))
}

/// Beta(5, 5): pushes probabilities toward 0 and 1
pub fn high_table() -> &'static BetaTable {
    static HIGH: OnceLock<BetaTable> = OnceLock::new();
    HIGH.get_or_init(|| BetaTable::build(5.0, 5.0))
}
