//! Field-name based PII screening.

/// Name fragments that mark a field as personally identifying.
pub const PII_PATTERNS: [&str; 7] = [
    "social_security",
    "ssn",
    "credit_card",
    "passport",
    "phone_number",
    "email_address",
    "date_of_birth",
];

fn normalize(field: &str) -> String {
    field.to_lowercase().replace(['-', ' '], "_")
}

/// Returns the fields (as given) whose normalised name contains a PII pattern.
pub fn scan_pii_fields<S: AsRef<str>>(field_names: &[S]) -> Vec<String> {
    field_names
        .iter()
        .map(AsRef::as_ref)
        .filter(|field| {
            let normalized = normalize(field);
            PII_PATTERNS.iter().any(|pattern| normalized.contains(pattern))
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_normalised_matches() {
        let fields = [
            "Email-Address",
            "user id",
            "Date of Birth",
            "prompt",
            "customer_ssn",
            "Phone Number",
        ];
        assert_eq!(
            scan_pii_fields(&fields),
            vec!["Email-Address", "Date of Birth", "customer_ssn", "Phone Number"]
        );
    }

    #[test]
    fn test_clean_schema() {
        assert!(scan_pii_fields(&["instruction", "input", "output"]).is_empty());
        assert!(scan_pii_fields::<&str>(&[]).is_empty());
    }
}
