use chrono::{DateTime, Utc};
use dpg_common::Money;
use intersolve::{
    helpers::normalize_phone_number,
    Address,
    ContactInfo,
    CreateCustomerRequest,
    CreateDebitCardRequest,
    IndividualInfo,
    PhoneNumber,
};
use serde::{Deserialize, Serialize};

use crate::{
    attributes::{AttributeBag, AttributeError, AttributeKind},
    db_types::{ReferenceId, Registration, WalletStatus},
    traits::ConfigurationError,
};

/// How often a job may be attempted before it is recorded as permanently failed.
pub const DEFAULT_MAX_JOB_ATTEMPTS: i64 = 3;

/// Card issuers size their risk checks on an estimated annual volume; this assumes the standard
/// monthly child allowance for a year.
const ESTIMATED_ANNUAL_PAYMENT_VOLUME: i64 = 12 * 44;

//--------------------------------------    Payment run     ----------------------------------------------------------
/// A request to disburse one payment cycle to a list of beneficiaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRunRequest {
    pub payment_nr: i64,
    /// The program's base transfer amount, scaled per beneficiary by their amount multiplier.
    pub transfer_amount: Money,
    pub reference_ids: Vec<ReferenceId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRunSummary {
    /// Jobs newly queued by this submission.
    pub job_count: usize,
    /// Reference ids that were not queued: unknown, out of scope, or in another program.
    pub skipped: Vec<ReferenceId>,
}

//--------------------------------------  Visa payment data  ---------------------------------------------------------
/// The attribute keys the Visa provider needs for customer and card issuance.
pub mod visa_attributes {
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const ADDRESS_STREET: &str = "addressStreet";
    pub const ADDRESS_HOUSE_NUMBER: &str = "addressHouseNumber";
    pub const ADDRESS_HOUSE_NUMBER_ADDITION: &str = "addressHouseNumberAddition";
    pub const ADDRESS_POSTAL_CODE: &str = "addressPostalCode";
    pub const ADDRESS_CITY: &str = "addressCity";
}

/// The per-beneficiary data the Visa provisioning chain sends to the provider, assembled from the
/// registration record and its validated attribute bag.
#[derive(Debug, Clone)]
pub struct VisaPaymentDetails {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub address_street: String,
    pub address_house_number: String,
    pub address_house_number_addition: String,
    pub address_postal_code: String,
    pub address_city: String,
}

impl VisaPaymentDetails {
    /// The attribute schema entries a program must declare to disburse through the Visa provider.
    pub fn required_attributes() -> Vec<(&'static str, AttributeKind)> {
        use visa_attributes::*;
        vec![
            (FIRST_NAME, AttributeKind::Text),
            (LAST_NAME, AttributeKind::Text),
            (ADDRESS_STREET, AttributeKind::Text),
            (ADDRESS_HOUSE_NUMBER, AttributeKind::Text),
            (ADDRESS_HOUSE_NUMBER_ADDITION, AttributeKind::Text),
            (ADDRESS_POSTAL_CODE, AttributeKind::Text),
            (ADDRESS_CITY, AttributeKind::Text),
        ]
    }

    pub fn from_registration(
        registration: &Registration,
        attributes: &AttributeBag,
    ) -> Result<Self, AttributeError> {
        use visa_attributes::*;
        Ok(Self {
            first_name: attributes.require_text(FIRST_NAME)?.to_string(),
            last_name: attributes.require_text(LAST_NAME)?.to_string(),
            phone_number: registration.phone_number.clone().unwrap_or_default(),
            address_street: attributes.require_text(ADDRESS_STREET)?.to_string(),
            address_house_number: attributes.require_text(ADDRESS_HOUSE_NUMBER)?.to_string(),
            address_house_number_addition: attributes
                .text(ADDRESS_HOUSE_NUMBER_ADDITION)
                .unwrap_or_default()
                .to_string(),
            address_postal_code: attributes.require_text(ADDRESS_POSTAL_CODE)?.to_string(),
            address_city: attributes.require_text(ADDRESS_CITY)?.to_string(),
        })
    }

    pub fn check_phone_number(&self) -> Result<(), ConfigurationError> {
        if self.phone_number.is_empty() {
            Err(ConfigurationError("registration has no phone number for card issuance".to_string()))
        } else {
            Ok(())
        }
    }

    fn address_line1(&self) -> String {
        format!("{} {}{}", self.address_street, self.address_house_number, self.address_house_number_addition)
    }

    fn address(&self, country: &str) -> Address {
        Address {
            address_type: "HOME".to_string(),
            address_line1: self.address_line1(),
            city: self.address_city.clone(),
            postal_code: self.address_postal_code.clone(),
            country: country.to_string(),
        }
    }

    pub fn customer_address(&self) -> Address {
        self.address("NL")
    }

    pub fn customer_request(&self, reference_id: &ReferenceId) -> CreateCustomerRequest {
        CreateCustomerRequest {
            external_reference: reference_id.to_string(),
            individual: IndividualInfo {
                last_name: self.last_name.clone(),
                estimated_annual_payment_volume_major_unit: ESTIMATED_ANNUAL_PAYMENT_VOLUME,
            },
            contact_info: ContactInfo {
                addresses: vec![self.customer_address()],
                phone_numbers: vec![PhoneNumber::mobile(&self.phone_number)],
            },
        }
    }

    pub fn debit_card_request(&self, brand: &str) -> CreateDebitCardRequest {
        CreateDebitCardRequest {
            brand: brand.to_string(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            mobile_number: normalize_phone_number(&self.phone_number),
            card_address: self.address("NLD"),
            pin_address: self.address("NLD"),
            // Cards ship with the PIN disabled; the beneficiary activates it on first use.
            pin_status: "D".to_string(),
        }
    }
}

//--------------------------------------   Wallet details    ---------------------------------------------------------
/// A wallet as reported to administrative callers, refreshed from the provider.
#[derive(Debug, Clone, Serialize)]
pub struct WalletDetailsView {
    pub token_code: String,
    pub balance: Money,
    /// Derived: the local block flag overrides the provider status.
    pub status: WalletStatus,
    pub debit_card_created: bool,
    pub issued_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}
