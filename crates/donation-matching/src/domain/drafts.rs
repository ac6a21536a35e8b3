//! # Drafts and Forms
//!
//! Boundary input for creating entries. Forms are what a calling layer
//! deserialises from a client; drafts are validated and strongly typed.

use super::errors::MatchError;
use super::value_objects::{BloodGroup, OrganType};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Youngest accepted age.
pub const MIN_AGE: u8 = 1;

/// Oldest accepted age.
pub const MAX_AGE: u8 = 120;

/// Raw donation input.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DonationForm {
    /// Required.
    pub donor_name: Option<String>,
    /// Required, 1..=120.
    pub age: Option<i64>,
    /// Required, one of the eight ABO/Rh groups.
    pub blood_group: Option<String>,
    /// Required.
    pub organ: Option<String>,
    /// Required.
    pub contact: Option<String>,
    /// Required.
    pub city: Option<String>,
    /// Required, `YYYY-MM-DD`.
    pub availability_date: Option<String>,
    /// Optional.
    pub medical_notes: Option<String>,
    /// Optional, defaults to zero.
    pub requested_compensation_amount: Option<Decimal>,
}

/// Raw request input.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RequestForm {
    /// Required.
    pub requester_name: Option<String>,
    /// Required, 1..=120.
    pub age: Option<i64>,
    /// Required, one of the eight ABO/Rh groups.
    pub blood_group: Option<String>,
    /// Required.
    pub organ_needed: Option<String>,
    /// Required.
    pub contact: Option<String>,
    /// Required.
    pub city: Option<String>,
    /// Optional.
    pub medical_reason: Option<String>,
    /// Optional, defaults to zero.
    pub budget: Option<Decimal>,
}

/// Validated donation fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationDraft {
    /// Donor's name.
    pub donor_name: String,
    /// Donor's age.
    pub age: u8,
    /// Donor's blood group.
    pub blood_group: BloodGroup,
    /// Organ offered.
    pub organ: OrganType,
    /// Contact details.
    pub contact: String,
    /// City.
    pub city: String,
    /// Availability date.
    pub availability_date: NaiveDate,
    /// Optional notes.
    pub medical_notes: Option<String>,
    /// Compensation asked for.
    pub requested_compensation: Decimal,
}

impl DonationDraft {
    /// Re-check the rules a form conversion enforces.
    pub fn validate(&self) -> Result<(), MatchError> {
        non_blank("donor_name", &self.donor_name)?;
        non_blank("contact", &self.contact)?;
        non_blank("city", &self.city)?;
        check_age(i64::from(self.age))?;
        non_negative("requested_compensation_amount", self.requested_compensation)
    }
}

impl TryFrom<DonationForm> for DonationDraft {
    type Error = MatchError;

    fn try_from(form: DonationForm) -> Result<Self, Self::Error> {
        let draft = DonationDraft {
            donor_name: required("donor_name", form.donor_name)?,
            age: check_age(form.age.ok_or_else(|| missing("age"))?)?,
            blood_group: required("blood_group", form.blood_group)?.parse()?,
            organ: OrganType::new(&required("organ", form.organ)?)?,
            contact: required("contact", form.contact)?,
            city: required("city", form.city)?,
            availability_date: parse_date(&required("availability_date", form.availability_date)?)?,
            medical_notes: optional(form.medical_notes),
            requested_compensation: form.requested_compensation_amount.unwrap_or_default(),
        };
        draft.validate()?;
        Ok(draft)
    }
}

/// Validated request fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    /// Patient's name.
    pub requester_name: String,
    /// Patient's age.
    pub age: u8,
    /// Required blood group.
    pub blood_group: BloodGroup,
    /// Organ needed.
    pub organ_needed: OrganType,
    /// Contact details.
    pub contact: String,
    /// City.
    pub city: String,
    /// Optional reason.
    pub medical_reason: Option<String>,
    /// Budget.
    pub budget: Decimal,
}

impl RequestDraft {
    /// Re-check the rules a form conversion enforces.
    pub fn validate(&self) -> Result<(), MatchError> {
        non_blank("requester_name", &self.requester_name)?;
        non_blank("contact", &self.contact)?;
        non_blank("city", &self.city)?;
        check_age(i64::from(self.age))?;
        non_negative("budget", self.budget)
    }
}

impl TryFrom<RequestForm> for RequestDraft {
    type Error = MatchError;

    fn try_from(form: RequestForm) -> Result<Self, Self::Error> {
        let draft = RequestDraft {
            requester_name: required("requester_name", form.requester_name)?,
            age: check_age(form.age.ok_or_else(|| missing("age"))?)?,
            blood_group: required("blood_group", form.blood_group)?.parse()?,
            organ_needed: OrganType::new(&required("organ_needed", form.organ_needed)?)?,
            contact: required("contact", form.contact)?,
            city: required("city", form.city)?,
            medical_reason: optional(form.medical_reason),
            budget: form.budget.unwrap_or_default(),
        };
        draft.validate()?;
        Ok(draft)
    }
}

fn missing(field: &str) -> MatchError {
    MatchError::Validation(format!("missing required field: {field}"))
}

fn required(field: &str, value: Option<String>) -> Result<String, MatchError> {
    let value = value.ok_or_else(|| missing(field))?;
    non_blank(field, &value)?;
    Ok(value.trim().to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_blank(field: &str, value: &str) -> Result<(), MatchError> {
    if value.trim().is_empty() {
        return Err(missing(field));
    }
    Ok(())
}

fn check_age(age: i64) -> Result<u8, MatchError> {
    u8::try_from(age)
        .ok()
        .filter(|a| (MIN_AGE..=MAX_AGE).contains(a))
        .ok_or_else(|| {
            MatchError::Validation(format!("age must be between {MIN_AGE} and {MAX_AGE}, got {age}"))
        })
}

fn non_negative(field: &str, amount: Decimal) -> Result<(), MatchError> {
    if amount < Decimal::ZERO {
        return Err(MatchError::Validation(format!("{field} must not be negative")));
    }
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate, MatchError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| MatchError::Validation(format!("invalid availability_date {raw:?}: {e}")))
}
