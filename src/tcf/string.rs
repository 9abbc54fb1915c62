//! TC string encoding and decoding (TCF v2 core string, v2.3 segment rules).
//!
//! A TC string is a `.`-separated list of base64url segments. The first one is
//! always the core segment; every following segment starts with a 3-bit type:
//!
//! | type | segment           |
//! |------|-------------------|
//! | 1    | disclosed vendors |
//! | 2    | allowed vendors   |
//! | 3    | publisher TC      |
//!
//! Vendor sections are written either as a bitfield or as a list of ranges,
//! whichever is shorter. Timestamps are stored in deciseconds since the epoch.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use time::OffsetDateTime;

use super::bits::{BitReader, BitWriter};
use super::errors::TcStringError;
use super::id_set::IdSet;
use super::model::{
    PublisherRestriction, PublisherSegment, RestrictionType, TcModel, PURPOSE_BITS, SPECIAL_FEATURE_BITS,
};

/// Core string version this codec reads and writes.
pub const TC_STRING_VERSION: u8 = 2;

const SEGMENT_DISCLOSED_VENDORS: u8 = 1;
const SEGMENT_ALLOWED_VENDORS: u8 = 2;
const SEGMENT_PUBLISHER_TC: u8 = 3;

const TC_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

const DECISECONDS_PER_NANO: i128 = 100_000_000;

/// Stateless TC string codec.
pub struct TcString;

impl TcString {
    /// Encodes `model` into its canonical string form.
    ///
    /// Fails only when the model breaks a format invariant: no vendor list
    /// attached, a reserved CMP id, an empty disclosed-vendors segment or ids
    /// that do not fit their fields.
    pub fn encode(model: &TcModel) -> Result<String, TcStringError> {
        if !model.has_vendor_list() {
            return Err(TcStringError::MissingVendorList);
        }
        if model.cmp_id <= 1 {
            return Err(TcStringError::ReservedCmpId(model.cmp_id));
        }
        if model.vendors_disclosed.is_empty() {
            return Err(TcStringError::NoDisclosedVendors);
        }

        let mut segments = vec![encode_core(model)?];

        let mut disclosed = BitWriter::new();
        disclosed.push("segmentType", u64::from(SEGMENT_DISCLOSED_VENDORS), 3)?;
        write_vendor_section(&mut disclosed, "vendorsDisclosed", &model.vendors_disclosed)?;
        segments.push(disclosed);

        if !model.vendors_allowed.is_empty() {
            let mut allowed = BitWriter::new();
            allowed.push("segmentType", u64::from(SEGMENT_ALLOWED_VENDORS), 3)?;
            write_vendor_section(&mut allowed, "vendorsAllowed", &model.vendors_allowed)?;
            segments.push(allowed);
        }

        if !model.publisher.is_empty() {
            segments.push(encode_publisher(&model.publisher)?);
        }

        Ok(segments
            .into_iter()
            .map(|w| TC_BASE64.encode(w.into_bytes()))
            .collect::<Vec<_>>()
            .join("."))
    }

    /// Decodes a TC string. Missing optional segments decode as empty sets.
    pub fn decode(encoded: &str) -> Result<TcModel, TcStringError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(TcStringError::Empty);
        }

        let mut parts = encoded.split('.');
        let core = parts.next().ok_or(TcStringError::Empty)?;
        let mut model = decode_core(&base64_decode(core)?)?;

        let mut seen = Vec::new();
        for part in parts {
            let bytes = base64_decode(part)?;
            let mut r = BitReader::new(&bytes);
            let segment_type = r.read(3)? as u8;
            if seen.contains(&segment_type) {
                return Err(TcStringError::DuplicateSegment(segment_type));
            }
            seen.push(segment_type);

            match segment_type {
                SEGMENT_DISCLOSED_VENDORS => model.vendors_disclosed = read_vendor_section(&mut r)?,
                SEGMENT_ALLOWED_VENDORS => model.vendors_allowed = read_vendor_section(&mut r)?,
                SEGMENT_PUBLISHER_TC => model.publisher = decode_publisher(&mut r)?,
                other => return Err(TcStringError::UnknownSegment(other)),
            }
        }

        Ok(model)
    }
}

fn base64_decode(segment: &str) -> Result<Vec<u8>, TcStringError> {
    if segment.is_empty() {
        return Err(TcStringError::Empty);
    }
    TC_BASE64
        .decode(segment)
        .map_err(|e| TcStringError::Base64(e.to_string()))
}

fn to_deciseconds(at: OffsetDateTime) -> u64 {
    (at.unix_timestamp_nanos() / DECISECONDS_PER_NANO).max(0) as u64
}

fn from_deciseconds(ds: u64) -> Result<OffsetDateTime, TcStringError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ds) * DECISECONDS_PER_NANO)
        .map_err(|_| TcStringError::InvalidTimestamp)
}

fn encode_core(model: &TcModel) -> Result<BitWriter, TcStringError> {
    let mut w = BitWriter::new();
    w.push("version", u64::from(TC_STRING_VERSION), 6)?;
    w.push("created", to_deciseconds(model.created), 36)?;
    w.push("lastUpdated", to_deciseconds(model.last_updated), 36)?;
    w.push("cmpId", u64::from(model.cmp_id), 12)?;
    w.push("cmpVersion", u64::from(model.cmp_version), 12)?;
    w.push("consentScreen", u64::from(model.consent_screen), 6)?;
    w.push_letters("consentLanguage", &model.consent_language)?;
    w.push("vendorListVersion", u64::from(model.vendor_list_version), 12)?;
    w.push("policyVersion", u64::from(model.tcf_policy_version), 6)?;
    w.push_bool(model.is_service_specific);
    w.push_bool(model.use_non_standard_texts);
    w.push_fixed_set("specialFeatureOptins", &model.special_feature_optins, SPECIAL_FEATURE_BITS)?;
    w.push_fixed_set("purposeConsents", &model.purpose_consents, PURPOSE_BITS)?;
    w.push_fixed_set("purposeLegitimateInterests", &model.purpose_legitimate_interests, PURPOSE_BITS)?;
    w.push_bool(model.purpose_one_treatment);
    w.push_letters("publisherCountryCode", &model.publisher_country_code)?;
    write_vendor_section(&mut w, "vendorConsents", &model.vendor_consents)?;
    write_vendor_section(&mut w, "vendorLegitimateInterests", &model.vendor_legitimate_interests)?;

    w.push("numPubRestrictions", model.publisher_restrictions.len() as u64, 12)?;
    for restriction in &model.publisher_restrictions {
        w.push("purposeId", u64::from(restriction.purpose_id), 6)?;
        w.push("restrictionType", u64::from(restriction.restriction_type.bits()), 2)?;
        write_ranges(&mut w, "publisherRestrictions", &restriction.vendors)?;
    }

    Ok(w)
}

fn decode_core(bytes: &[u8]) -> Result<TcModel, TcStringError> {
    let mut r = BitReader::new(bytes);

    let version = r.read(6)? as u8;
    if version != TC_STRING_VERSION {
        return Err(TcStringError::UnsupportedVersion(version));
    }

    let created = from_deciseconds(r.read(36)?)?;
    let last_updated = from_deciseconds(r.read(36)?)?;
    let mut model = TcModel::new(created);
    model.created = created;
    model.last_updated = last_updated;
    model.cmp_id = r.read_u16(12)?;
    model.cmp_version = r.read_u16(12)?;
    model.consent_screen = r.read(6)? as u8;
    model.consent_language = r.read_letters()?;
    model.vendor_list_version = r.read_u16(12)?;
    model.tcf_policy_version = r.read(6)? as u8;
    model.is_service_specific = r.read_bool()?;
    model.use_non_standard_texts = r.read_bool()?;
    model.special_feature_optins = r.read_fixed_set(SPECIAL_FEATURE_BITS)?;
    model.purpose_consents = r.read_fixed_set(PURPOSE_BITS)?;
    model.purpose_legitimate_interests = r.read_fixed_set(PURPOSE_BITS)?;
    model.purpose_one_treatment = r.read_bool()?;
    model.publisher_country_code = r.read_letters()?;
    model.vendor_consents = read_vendor_section(&mut r)?;
    model.vendor_legitimate_interests = read_vendor_section(&mut r)?;

    let restrictions = r.read(12)?;
    for _ in 0..restrictions {
        let purpose_id = r.read(6)? as u8;
        let restriction_type = RestrictionType::from_bits(r.read(2)? as u8);
        let vendors = read_ranges(&mut r)?;
        model.publisher_restrictions.push(PublisherRestriction {
            purpose_id,
            restriction_type,
            vendors,
        });
    }

    Ok(model)
}

fn encode_publisher(segment: &PublisherSegment) -> Result<BitWriter, TcStringError> {
    let mut w = BitWriter::new();
    w.push("segmentType", u64::from(SEGMENT_PUBLISHER_TC), 3)?;
    w.push_fixed_set("pubPurposesConsent", &segment.purpose_consents, PURPOSE_BITS)?;
    w.push_fixed_set("pubPurposesLITransparency", &segment.purpose_legitimate_interests, PURPOSE_BITS)?;
    w.push("numCustomPurposes", u64::from(segment.num_custom_purposes), 6)?;
    let width = u16::from(segment.num_custom_purposes);
    w.push_fixed_set("customPurposesConsent", &segment.custom_purpose_consents, width)?;
    w.push_fixed_set("customPurposesLITransparency", &segment.custom_purpose_legitimate_interests, width)?;
    Ok(w)
}

fn decode_publisher(r: &mut BitReader<'_>) -> Result<PublisherSegment, TcStringError> {
    let purpose_consents = r.read_fixed_set(PURPOSE_BITS)?;
    let purpose_legitimate_interests = r.read_fixed_set(PURPOSE_BITS)?;
    let num_custom_purposes = r.read(6)? as u8;
    let width = u16::from(num_custom_purposes);
    Ok(PublisherSegment {
        purpose_consents,
        purpose_legitimate_interests,
        num_custom_purposes,
        custom_purpose_consents: r.read_fixed_set(width)?,
        custom_purpose_legitimate_interests: r.read_fixed_set(width)?,
    })
}

/// Bits needed for the range form: 12-bit count, then per run a flag,
/// a start id and, for real ranges, an end id.
fn range_encoding_bits(ranges: &[(u16, u16)]) -> usize {
    12 + ranges
        .iter()
        .map(|(start, end)| if start == end { 17 } else { 33 })
        .sum::<usize>()
}

fn write_vendor_section(w: &mut BitWriter, field: &'static str, set: &IdSet) -> Result<(), TcStringError> {
    if set.has(0) {
        return Err(TcStringError::IdOutOfRange { field, id: 0 });
    }
    let max_id = set.max_id();
    w.push("maxVendorId", u64::from(max_id), 16)?;

    let ranges = set.ranges();
    let use_ranges = range_encoding_bits(&ranges) < usize::from(max_id);
    w.push_bool(use_ranges);

    if use_ranges {
        write_range_entries(w, &ranges)
    } else {
        for id in 1..=max_id {
            w.push_bool(set.has(id));
        }
        Ok(())
    }
}

fn read_vendor_section(r: &mut BitReader<'_>) -> Result<IdSet, TcStringError> {
    let max_id = r.read_u16(16)?;
    let is_range = r.read_bool()?;
    if is_range {
        read_ranges(r)
    } else {
        r.read_fixed_set(max_id)
    }
}

fn write_ranges(w: &mut BitWriter, field: &'static str, set: &IdSet) -> Result<(), TcStringError> {
    if set.has(0) {
        return Err(TcStringError::IdOutOfRange { field, id: 0 });
    }
    write_range_entries(w, &set.ranges())
}

fn write_range_entries(w: &mut BitWriter, ranges: &[(u16, u16)]) -> Result<(), TcStringError> {
    w.push("numEntries", ranges.len() as u64, 12)?;
    for (start, end) in ranges {
        let is_range = start != end;
        w.push_bool(is_range);
        w.push("startOrOnlyVendorId", u64::from(*start), 16)?;
        if is_range {
            w.push("endVendorId", u64::from(*end), 16)?;
        }
    }
    Ok(())
}

fn read_ranges(r: &mut BitReader<'_>) -> Result<IdSet, TcStringError> {
    let entries = r.read(12)?;
    let mut set = IdSet::new();
    for _ in 0..entries {
        let is_range = r.read_bool()?;
        let start = r.read_u16(16)?;
        let end = if is_range { r.read_u16(16)? } else { start };
        // Ids are 1-based; anything else could never be written back.
        if start == 0 || end < start {
            return Err(TcStringError::Malformed(format!("invalid vendor range {start}..={end}")));
        }
        set.extend(start..=end);
    }
    Ok(set)
}
