use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AppError;

const DIGITS: usize = 6;
/// 允许前后各偏移一个时间窗口
const SKEW: u8 = 1;
const STEP: u64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct TotpEnrollment {
    pub secret: String,
    pub otpauth_url: String,
}

/// otpauth 标签里不允许出现冒号
fn label(value: &str) -> String {
    value.replace(':', "_")
}

pub fn generate_totp_secret(issuer: &str, account: &str) -> Result<TotpEnrollment, AppError> {
    let secret = Secret::generate_secret()
        .to_bytes()
        .map_err(|e| AppError::Internal(format!("totp secret: {:?}", e)))?;
    let totp = TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP,
        secret,
        Some(label(issuer)),
        label(account),
    )
    .map_err(|e| AppError::Internal(format!("totp: {}", e)))?;

    Ok(TotpEnrollment {
        secret: totp.get_secret_base32(),
        otpauth_url: totp.get_url(),
    })
}

pub(crate) fn totp_from_base32(secret: &str) -> Option<TOTP> {
    let bytes = Secret::Encoded(secret.to_string()).to_bytes().ok()?;
    Some(TOTP::new_unchecked(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP,
        bytes,
        None,
        String::new(),
    ))
}

pub fn validate_totp_code(secret: &str, code: &str) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    validate_totp_code_at(secret, code, now)
}

pub fn validate_totp_code_at(secret: &str, code: &str, unix_time: u64) -> bool {
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match totp_from_base32(secret) {
        Some(totp) => totp.check(code, unix_time),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_produces_usable_secret() {
        let enrollment = generate_totp_secret("ADCMS", "alice").unwrap();
        assert!(enrollment.otpauth_url.starts_with("otpauth://totp/"));
        assert!(enrollment.otpauth_url.contains("issuer=ADCMS"));

        let totp = totp_from_base32(&enrollment.secret).unwrap();
        let t = 1_700_000_000;
        let code = totp.generate(t);
        assert!(validate_totp_code_at(&enrollment.secret, &code, t));
    }

    #[test]
    fn adjacent_window_accepted_distant_rejected() {
        let enrollment = generate_totp_secret("ADCMS", "bob").unwrap();
        let totp = totp_from_base32(&enrollment.secret).unwrap();
        let t = 1_700_000_010;
        let code = totp.generate(t);

        assert!(validate_totp_code_at(&enrollment.secret, &code, t + STEP));
        assert!(validate_totp_code_at(&enrollment.secret, &code, t - STEP));
        let far = t + 10 * STEP;
        if totp.generate(far) != code {
            assert!(!validate_totp_code_at(&enrollment.secret, &code, far));
        }
    }

    #[test]
    fn malformed_input_is_rejected() {
        let enrollment = generate_totp_secret("ADCMS", "carol").unwrap();
        assert!(!validate_totp_code_at(&enrollment.secret, "12345", 1_700_000_000));
        assert!(!validate_totp_code_at(&enrollment.secret, "abcdef", 1_700_000_000));
        assert!(!validate_totp_code_at("not base32 !!", "123456", 1_700_000_000));
    }
}
