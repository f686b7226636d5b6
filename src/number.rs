//! Number Theory Utilities
//!
//! Integer helpers used to derive the diamond: greatest common divisor,
//! prime sieving, prime-limit filtering, largest prime factors and octave
//! folding. Folding has two entry points: an exact one over integer
//! fractions (used for pitch identity) and a float one (used for display
//! and sounding ratios).

/// Greatest common divisor of the absolute values of `a` and `b`.
///
/// `gcd(0, 0)` is 0 by convention.
pub fn gcd(a: i64, b: i64) -> u64 {
    gcd_u64(a.unsigned_abs(), b.unsigned_abs())
}

/// Unsigned Euclidean GCD
#[inline]
pub fn gcd_u64(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// All primes `<= max(n, 2)` in ascending order (sieve of Eratosthenes)
pub fn primes_up_to(n: u64) -> Vec<u64> {
    let n = n.max(2) as usize;
    let mut sieve = vec![true; n + 1];
    sieve[0] = false;
    sieve[1] = false;

    let mut p = 2;
    while p * p <= n {
        if sieve[p] {
            let mut k = p * p;
            while k <= n {
                sieve[k] = false;
                k += p;
            }
        }
        p += 1;
    }

    sieve
        .iter()
        .enumerate()
        .filter(|(_, &is_prime)| is_prime)
        .map(|(i, _)| i as u64)
        .collect()
}

/// Check whether `n` factors completely over `allowed`
///
/// Each allowed prime is stripped from `n` as many times as it divides;
/// the check succeeds when nothing is left over. `1` is always allowed.
pub fn factor_allowed(n: u64, allowed: &[u64]) -> bool {
    if n == 1 {
        return true;
    }
    if n == 0 {
        return false;
    }

    let mut m = n;
    for &p in allowed {
        if p < 2 {
            continue;
        }
        while m % p == 0 {
            m /= p;
        }
    }
    m == 1
}

/// Largest prime factor of `n` by trial division.
///
/// Returns the sentinel `1` for `n <= 1`; 1 is not a prime, so callers
/// must treat unison separately.
pub fn largest_prime_factor(n: u64) -> u64 {
    if n <= 1 {
        return 1;
    }

    let mut n = n;
    let mut max_prime = 1;

    while n % 2 == 0 {
        max_prime = 2;
        n /= 2;
    }

    let mut p = 3;
    while p <= n / p {
        while n % p == 0 {
            max_prime = p;
            n /= p;
        }
        p += 2;
    }

    if n > 2 {
        max_prime = n;
    }
    max_prime
}

/// Fold a positive real into the octave `[1, 2)` by halving or doubling.
///
/// Non-positive and non-finite inputs cannot be folded and are returned
/// unchanged.
pub fn fold_to_octave(value: f64) -> f64 {
    if !(value.is_finite() && value > 0.0) {
        return value;
    }

    let mut x = value;
    while x >= 2.0 {
        x /= 2.0;
    }
    while x < 1.0 {
        x *= 2.0;
    }
    x
}

/// Fold the fraction `num/den` into `[1, 2)` with exact arithmetic and
/// reduce it to lowest terms.
///
/// Equal terms (including the diagonal of the diamond) always give `(1, 1)`.
/// A zero term has no octave class and is returned reduced but unfolded, as
/// is a fraction whose folded numerator would not fit in a `u64`.
pub fn fold_fraction(num: u64, den: u64) -> (u64, u64) {
    if num == den {
        return (1, 1);
    }
    if num == 0 || den == 0 {
        return reduce_fraction(num, den);
    }

    // Reduce first so the doublings below stay small. Doubling happens in
    // u128, where `n < 2 * d` always fits.
    let (num, den) = reduce_fraction(num, den);
    let (mut n, mut d) = (num as u128, den as u128);
    while n >= d * 2 {
        d *= 2;
    }
    while n < d {
        n *= 2;
    }
    let g = gcd_u128(n, d);
    match (u64::try_from(n / g), u64::try_from(d / g)) {
        (Ok(n), Ok(d)) => (n, d),
        _ => (num, den),
    }
}

fn gcd_u128(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Reduce `num/den` to lowest terms
pub fn reduce_fraction(num: u64, den: u64) -> (u64, u64) {
    let g = gcd_u64(num, den);
    if g == 0 {
        return (num, den);
    }
    (num / g, den / g)
}

/// Reduced ratio for a diamond cell with row value `a` and column value `b`.
///
/// The column value is the numerator: the cell sounds `b/a`.
pub fn reduce(a: u64, b: u64) -> (u64, u64) {
    reduce_fraction(b, a)
}
