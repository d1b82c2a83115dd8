// Prefix scanner for numeric literals. Recognises an optional sign, decimal
// digits, a decimal point, a signed exponent, a 0x hex form, and trailing
// whitespace; scanning stops at the first character that cannot extend the
// literal. The integer interpretation accumulates into a 63-bit magnitude
// and reports truncation (with saturation to the signed bound) rather than
// wrapping.

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ScanStatus {
    Clean,
    Truncated,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScannedNum<'a> {
    pub negative: bool,
    /// Digits before the point (hex digits for the 0x form).
    pub int_digits: &'a [u8],
    pub frac_digits: &'a [u8],
    pub exponent: i64,
    pub is_hex: bool,
    pub status: ScanStatus,
    /// The accepted literal, sign included, whitespace excluded.
    pub span: &'a [u8],
    /// Bytes consumed, trailing whitespace included.
    pub consumed: usize,
}

/// Longest significant-digit run the integer interpretation accepts before
/// declaring the literal truncated.
const MAX_SIG_DIGITS: usize = 63;
const MAX_HEX_DIGITS: usize = 16;

/// Scan a numeric literal prefix. `None` means not even one digit was found.
pub fn scan_number(bytes: &[u8]) -> Option<ScannedNum<'_>> {
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let span_start = i;
    let mut negative = false;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        negative = bytes[i] == b'-';
        i += 1;
    }

    // Hex form: 0x / 0X followed by at least one hex digit.
    if i + 2 < bytes.len()
        && bytes[i] == b'0'
        && (bytes[i + 1] == b'x' || bytes[i + 1] == b'X')
        && bytes[i + 2].is_ascii_hexdigit()
    {
        let start = i + 2;
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_hexdigit() {
            end += 1;
        }
        let digits = &bytes[start..end];
        let sig = digits.iter().position(|d| *d != b'0').map_or(0, |z| digits.len() - z);
        let mut status = ScanStatus::Clean;
        if sig > MAX_HEX_DIGITS {
            status = ScanStatus::Truncated;
        } else if sig == MAX_HEX_DIGITS {
            // A full 16 hex digits with the high nibble set does not fit the
            // signed 63-bit magnitude.
            let first = digits[digits.len() - sig];
            if hex_val(first) >= 8 {
                status = ScanStatus::Truncated;
            }
        }
        let span = &bytes[span_start..end];
        let consumed = consume_trailing_ws(bytes, end);
        return Some(ScannedNum {
            negative,
            int_digits: digits,
            frac_digits: &[],
            exponent: 0,
            is_hex: true,
            status,
            span,
            consumed,
        });
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = &bytes[int_start..i];

    let mut frac_digits: &[u8] = &[];
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        // A bare '.' with no digits on either side is not a literal.
        if int_digits.is_empty() && j == frac_start {
            return None;
        }
        frac_digits = &bytes[frac_start..j];
        i = j;
    } else if int_digits.is_empty() {
        return None;
    }

    let mut exponent: i64 = 0;
    let mut status = ScanStatus::Clean;
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        let mut exp_neg = false;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            exp_neg = bytes[j] == b'-';
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            // Exponent accepted; accumulate with an overflow clamp.
            for d in &bytes[exp_start..j] {
                exponent = exponent * 10 + (d - b'0') as i64;
                if exponent > 999_999 {
                    exponent = 999_999;
                    status = ScanStatus::Truncated;
                    // keep consuming digits, they can no longer matter
                }
            }
            if exp_neg {
                exponent = -exponent;
            }
            i = j;
        }
        // 'e' with no digits: stop before it, the literal ends at i.
    }

    let span = &bytes[span_start..i];
    let consumed = consume_trailing_ws(bytes, i);
    Some(ScannedNum {
        negative,
        int_digits,
        frac_digits,
        exponent,
        is_hex: false,
        status,
        span,
        consumed,
    })
}

fn consume_trailing_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn hex_val(d: u8) -> u8 {
    match d {
        b'0'..=b'9' => d - b'0',
        b'a'..=b'f' => d - b'a' + 10,
        b'A'..=b'F' => d - b'A' + 10,
        _ => 0,
    }
}

impl<'a> ScannedNum<'a> {
    /// Integer interpretation with round-half-away-from-zero on the
    /// fractional part. Magnitude saturates at the signed 63-bit bound; a
    /// significant-digit run past the accumulator width reports Truncated.
    pub fn to_i64(&self) -> (i64, ScanStatus) {
        if self.is_hex {
            return self.hex_to_i64();
        }
        let mut status = self.status;

        // The effective digit string with the point moved by the exponent.
        let point = self.int_digits.len() as i64 + self.exponent;
        let digits: Vec<u8> = self
            .int_digits
            .iter()
            .chain(self.frac_digits.iter())
            .copied()
            .collect();
        let leading_zeros = digits.iter().take_while(|d| **d == b'0').count() as i64;
        let sig_int = point - leading_zeros;
        if sig_int > MAX_SIG_DIGITS as i64 {
            status = ScanStatus::Truncated;
            let v = if self.negative { i64::MIN + 1 } else { i64::MAX };
            return (v, status);
        }

        let mut acc: i64 = 0;
        let mut saturated = false;
        for k in 0..point.max(0) {
            let d = if (k as usize) < digits.len() {
                digits[k as usize] - b'0'
            } else {
                0
            };
            if !saturated {
                match acc.checked_mul(10).and_then(|a| a.checked_add(d as i64)) {
                    Some(a) => acc = a,
                    None => {
                        acc = i64::MAX;
                        saturated = true;
                    }
                }
            }
        }
        if !saturated {
            let round_digit = if point >= 0 && (point as usize) < digits.len() {
                digits[point as usize] - b'0'
            } else {
                0
            };
            if round_digit >= 5 {
                acc = acc.saturating_add(1);
            }
        }
        let v = if self.negative { -acc } else { acc };
        (v, status)
    }

    fn hex_to_i64(&self) -> (i64, ScanStatus) {
        if self.status == ScanStatus::Truncated {
            let v = if self.negative { i64::MIN + 1 } else { i64::MAX };
            return (v, ScanStatus::Truncated);
        }
        let mut acc: i64 = 0;
        for d in self.int_digits {
            acc = (acc << 4) | hex_val(*d) as i64;
        }
        let v = if self.negative { -acc } else { acc };
        (v, ScanStatus::Clean)
    }

    /// Floating interpretation. Hex literals reuse the integer path.
    pub fn to_f64(&self) -> f64 {
        if self.is_hex {
            let (v, _) = self.hex_to_i64();
            return v as f64;
        }
        if let Some(v) = std::str::from_utf8(self.span)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
        {
            return v;
        }
        // Rebuild from parts for the spans std parsing rejects (e.g. "5.e3").
        let mut m = 0f64;
        for d in self.int_digits.iter().chain(self.frac_digits.iter()) {
            m = m * 10.0 + (d - b'0') as f64;
        }
        let exp = self.exponent - self.frac_digits.len() as i64;
        let v = m * 10f64.powi(exp.clamp(-400, 400) as i32);
        if self.negative {
            -v
        } else {
            v
        }
    }
}
