use dicom_core::header::Header;
use dicom_core::value::DataSetSequence;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use thiserror::Error;
use tracing::debug;

use crate::coding::{self, CodedConcept};
use crate::content;
use crate::filter;
use crate::uid;

const MODALITY_SR: &str = "SR";

const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.10.1082.1";
const IMPLEMENTATION_VERSION_NAME: &str = concat!("dicom-sr-", env!("CARGO_PKG_VERSION"));

/// Configuration for one synthesis call.
#[derive(Debug, Clone)]
pub struct SrOptions {
    /// UID root for the generated SOP Instance UID; blank falls back to
    /// [`uid::DEFAULT_UID_PREFIX`].
    pub uid_prefix: String,
}

impl Default for SrOptions {
    fn default() -> Self {
        SrOptions {
            uid_prefix: uid::DEFAULT_UID_PREFIX.to_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("study date is missing or empty")]
    MissingStudyDate,

    #[error("study date {value:?} is not in YYYYMMDD form")]
    MalformedStudyDate { value: String },

    #[error("reconstruction diameter {value:?} is not a number")]
    MalformedDiameter {
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("failed to assemble the file meta group")]
    BuildMeta(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Transform an image data set into a Basic Text SR object.
///
/// The source is copied and stripped through [`filter::should_remove`],
/// restamped with SR identity attributes and a fresh SOP Instance UID, and
/// given a "Patient Characteristics" content tree synthesized from specific
/// source values. The source is never modified; on error no report exists
/// and the caller keeps the original object.
pub fn synthesize(
    src: &InMemDicomObject,
    options: &SrOptions,
) -> Result<FileDicomObject<InMemDicomObject>, SynthesisError> {
    let mut out = InMemDicomObject::new_empty();
    for elem in src {
        out.put(elem.clone());
    }

    // Two-phase strip: collect the flagged tags first, then remove, so the
    // set is never mutated while it is being walked.
    let flagged: Vec<Tag> = (&out)
        .into_iter()
        .map(|elem| elem.tag())
        .filter(|&tag| filter::should_remove(tag))
        .collect();
    for tag in flagged {
        if !out.remove_element(tag) {
            debug!(%tag, "flagged attribute could not be removed");
        }
    }

    let sop_instance_uid = uid::new_uid(&options.uid_prefix);

    out.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(uids::BASIC_TEXT_SR_STORAGE),
    ));
    out.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(sop_instance_uid.as_str()),
    ));
    out.put(DataElement::new(
        tags::MODALITY,
        VR::CS,
        PrimitiveValue::from(MODALITY_SR),
    ));

    if let Some(title) = document_title(src) {
        out.put(DataElement::new(
            tags::CONCEPT_NAME_CODE_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![title.to_item()]),
        ));
    }

    let children = characteristics_items(src)?;
    let root = content::container_item(&coding::PATIENT_CHARACTERISTICS, children);
    out.put(DataElement::new(
        tags::CONTENT_SEQUENCE,
        VR::SQ,
        DataSetSequence::from(vec![root]),
    ));

    out.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::BASIC_TEXT_SR_STORAGE)
            .media_storage_sop_instance_uid(sop_instance_uid)
            .implementation_class_uid(IMPLEMENTATION_CLASS_UID)
            .implementation_version_name(IMPLEMENTATION_VERSION_NAME),
    )
    .map_err(|e| SynthesisError::BuildMeta(Box::new(e)))
}

/// Map the source modality to the document title concept.
///
/// Only CT and MR carry a title; any other or missing modality leaves the
/// document-level concept name absent.
fn document_title(src: &InMemDicomObject) -> Option<&'static CodedConcept> {
    match string_value(src, tags::MODALITY)?.as_str() {
        "CT" => Some(&coding::CT_REPORT),
        "MR" => Some(&coding::MRI_REPORT),
        _ => None,
    }
}

/// Build the TEXT children of the Patient Characteristics container, in
/// template order. Absent or blank source values are skipped, except the
/// study date, which is required.
fn characteristics_items(
    src: &InMemDicomObject,
) -> Result<Vec<InMemDicomObject>, SynthesisError> {
    let mut items = Vec::new();

    if let Some(value) = string_value(src, tags::INSTITUTION_NAME) {
        content::append_text(&mut items, &coding::INSTITUTION_NAME, &value);
    }
    if let Some(value) = string_value(src, tags::PATIENT_NAME) {
        content::append_text(&mut items, &coding::SUBJECT_NAME, &value);
    }
    if let Some(value) = string_value(src, tags::PATIENT_ID) {
        content::append_text(&mut items, &coding::SUBJECT_ID, &value);
    }

    let study_date =
        string_value(src, tags::STUDY_DATE).ok_or(SynthesisError::MissingStudyDate)?;
    content::append_text(&mut items, &coding::STUDY_DATE, &format_study_date(&study_date)?);

    if let Some(value) = string_value(src, tags::STUDY_DESCRIPTION) {
        content::append_text(&mut items, &coding::PROCEDURE_DESCRIPTION, &value);
    }
    if let Some(value) = string_value(src, tags::CONTRAST_BOLUS_AGENT) {
        content::append_text(&mut items, &coding::CONTRAST_ADMINISTERED, &value);
    }
    if let Some(value) = string_value(src, tags::MAGNETIC_FIELD_STRENGTH) {
        content::append_text(&mut items, &coding::MAGNETIC_FIELD_STRENGTH, &value);
    }
    if let Some(value) = string_value(src, tags::RECONSTRUCTION_DIAMETER) {
        content::append_text(
            &mut items,
            &coding::RECONSTRUCTION_DIAMETER,
            &format_diameter(&value)?,
        );
    }

    Ok(items)
}

/// Reformat a DICOM date from `YYYYMMDD` to `MM/DD/YYYY`.
///
/// Anything other than exactly eight ASCII digits is rejected.
fn format_study_date(raw: &str) -> Result<String, SynthesisError> {
    let value = raw.trim();
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SynthesisError::MalformedStudyDate {
            value: value.to_owned(),
        });
    }
    Ok(format!("{}/{}/{}", &value[4..6], &value[6..8], &value[0..4]))
}

/// Render a reconstruction diameter in millimeters as one-decimal
/// centimeters, e.g. "250" becomes "25.0 cm".
fn format_diameter(raw: &str) -> Result<String, SynthesisError> {
    let value = raw.trim();
    let millimeters: f64 = value.parse().map_err(|source| SynthesisError::MalformedDiameter {
        value: value.to_owned(),
        source,
    })?;
    Ok(format!("{:.1} cm", millimeters / 10.0))
}

/// Read an attribute as a trimmed string, treating absent, unreadable, and
/// blank values alike.
fn string_value(src: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = src.element(tag).ok()?;
    let value = element.to_str().ok()?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_mr_source() -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            tags::MODALITY,
            VR::CS,
            PrimitiveValue::from("MR"),
        ));
        obj.put(DataElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from("DOE^JANE"),
        ));
        obj.put(DataElement::new(
            tags::PATIENT_ID,
            VR::LO,
            PrimitiveValue::from("12345"),
        ));
        obj.put(DataElement::new(
            tags::STUDY_DATE,
            VR::DA,
            PrimitiveValue::from("20240101"),
        ));
        obj.put(DataElement::new(
            tags::STUDY_DESCRIPTION,
            VR::LO,
            PrimitiveValue::from("Brain MRI"),
        ));
        obj
    }

    fn child_meanings(sr: &InMemDicomObject) -> Vec<String> {
        let roots = sr
            .element(tags::CONTENT_SEQUENCE)
            .unwrap()
            .value()
            .items()
            .unwrap();
        assert_eq!(roots.len(), 1);
        let children = roots[0]
            .element(tags::CONTENT_SEQUENCE)
            .unwrap()
            .value()
            .items()
            .unwrap();
        children
            .iter()
            .map(|item| {
                item.element(tags::CONCEPT_NAME_CODE_SEQUENCE)
                    .unwrap()
                    .value()
                    .items()
                    .unwrap()[0]
                    .element(tags::CODE_MEANING)
                    .unwrap()
                    .to_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    fn child_text(sr: &InMemDicomObject, index: usize) -> String {
        let roots = sr
            .element(tags::CONTENT_SEQUENCE)
            .unwrap()
            .value()
            .items()
            .unwrap();
        let children = roots[0]
            .element(tags::CONTENT_SEQUENCE)
            .unwrap()
            .value()
            .items()
            .unwrap();
        children[index]
            .element(tags::TEXT_VALUE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn study_date_is_reformatted() {
        assert_eq!(format_study_date("20230415").unwrap(), "04/15/2023");
        assert_eq!(format_study_date("20240101").unwrap(), "01/01/2024");
    }

    #[test]
    fn short_study_date_is_rejected() {
        assert!(matches!(
            format_study_date("2023"),
            Err(SynthesisError::MalformedStudyDate { .. })
        ));
        assert!(matches!(
            format_study_date("2023-04-15"),
            Err(SynthesisError::MalformedStudyDate { .. })
        ));
    }

    #[test]
    fn diameter_is_rendered_in_centimeters() {
        assert_eq!(format_diameter("250").unwrap(), "25.0 cm");
        assert_eq!(format_diameter("248").unwrap(), "24.8 cm");
        assert_eq!(format_diameter(" 250.5 ").unwrap(), "25.1 cm");
    }

    #[test]
    fn bad_diameter_is_rejected() {
        assert!(matches!(
            format_diameter("wide"),
            Err(SynthesisError::MalformedDiameter { .. })
        ));
    }

    #[test]
    fn minimal_mr_object_yields_four_children() {
        let sr = synthesize(&minimal_mr_source(), &SrOptions::default()).unwrap();
        assert_eq!(
            child_meanings(&sr),
            ["Subject Name", "Subject ID", "Study Date", "Procedure Description"]
        );
        assert_eq!(child_text(&sr, 0), "DOE^JANE");
        assert_eq!(child_text(&sr, 2), "01/01/2024");
    }

    #[test]
    fn identity_attributes_are_stamped() {
        let sr = synthesize(&minimal_mr_source(), &SrOptions::default()).unwrap();
        assert_eq!(
            sr.element(tags::MODALITY).unwrap().to_str().unwrap(),
            "SR"
        );
        assert_eq!(
            sr.element(tags::SOP_CLASS_UID).unwrap().to_str().unwrap(),
            uids::BASIC_TEXT_SR_STORAGE
        );
        let uid = sr
            .element(tags::SOP_INSTANCE_UID)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(uid.starts_with("9999."));

        let meta = sr.meta();
        assert_eq!(
            meta.transfer_syntax.trim_end_matches('\0'),
            uids::EXPLICIT_VR_LITTLE_ENDIAN
        );
        assert_eq!(
            meta.media_storage_sop_class_uid.trim_end_matches('\0'),
            uids::BASIC_TEXT_SR_STORAGE
        );
    }

    #[test]
    fn uid_prefix_is_honored() {
        let options = SrOptions {
            uid_prefix: "1.2.840.99999".to_owned(),
        };
        let sr = synthesize(&minimal_mr_source(), &options).unwrap();
        let uid = sr
            .element(tags::SOP_INSTANCE_UID)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(uid.starts_with("1.2.840.99999."));
    }

    #[test]
    fn mr_title_concept_is_attached() {
        let sr = synthesize(&minimal_mr_source(), &SrOptions::default()).unwrap();
        let title_items = sr
            .element(tags::CONCEPT_NAME_CODE_SEQUENCE)
            .unwrap()
            .value()
            .items()
            .unwrap();
        assert_eq!(title_items.len(), 1);
        assert_eq!(
            title_items[0]
                .element(tags::CODE_VALUE)
                .unwrap()
                .to_str()
                .unwrap(),
            "18755-9"
        );
        assert_eq!(
            title_items[0]
                .element(tags::CODE_MEANING)
                .unwrap()
                .to_str()
                .unwrap(),
            "MRI Report"
        );
    }

    #[test]
    fn ct_title_concept_is_attached() {
        let mut src = minimal_mr_source();
        src.put(DataElement::new(
            tags::MODALITY,
            VR::CS,
            PrimitiveValue::from("CT"),
        ));
        let sr = synthesize(&src, &SrOptions::default()).unwrap();
        let title_items = sr
            .element(tags::CONCEPT_NAME_CODE_SEQUENCE)
            .unwrap()
            .value()
            .items()
            .unwrap();
        assert_eq!(
            title_items[0]
                .element(tags::CODE_VALUE)
                .unwrap()
                .to_str()
                .unwrap(),
            "18747-6"
        );
    }

    #[test]
    fn unmapped_modality_has_no_title() {
        let mut src = minimal_mr_source();
        src.put(DataElement::new(
            tags::MODALITY,
            VR::CS,
            PrimitiveValue::from("US"),
        ));
        let sr = synthesize(&src, &SrOptions::default()).unwrap();
        assert!(sr.element(tags::CONCEPT_NAME_CODE_SEQUENCE).is_err());
    }

    #[test]
    fn missing_study_date_aborts_synthesis() {
        let mut src = minimal_mr_source();
        src.remove_element(tags::STUDY_DATE);
        assert!(matches!(
            synthesize(&src, &SrOptions::default()),
            Err(SynthesisError::MissingStudyDate)
        ));
    }

    #[test]
    fn malformed_study_date_aborts_synthesis() {
        let mut src = minimal_mr_source();
        src.put(DataElement::new(
            tags::STUDY_DATE,
            VR::DA,
            PrimitiveValue::from("2023"),
        ));
        assert!(matches!(
            synthesize(&src, &SrOptions::default()),
            Err(SynthesisError::MalformedStudyDate { .. })
        ));
    }

    #[test]
    fn optional_items_appear_when_present() {
        let mut src = minimal_mr_source();
        src.put(DataElement::new(
            tags::INSTITUTION_NAME,
            VR::LO,
            PrimitiveValue::from("General Hospital"),
        ));
        src.put(DataElement::new(
            tags::CONTRAST_BOLUS_AGENT,
            VR::LO,
            PrimitiveValue::from("GADOLINIUM"),
        ));
        src.put(DataElement::new(
            tags::MAGNETIC_FIELD_STRENGTH,
            VR::DS,
            PrimitiveValue::from("1.5"),
        ));
        src.put(DataElement::new(
            tags::RECONSTRUCTION_DIAMETER,
            VR::DS,
            PrimitiveValue::from("248"),
        ));
        let sr = synthesize(&src, &SrOptions::default()).unwrap();
        assert_eq!(
            child_meanings(&sr),
            [
                "Institution Name",
                "Subject Name",
                "Subject ID",
                "Study Date",
                "Procedure Description",
                "Contrast Administered",
                "Magnetic Field Strength",
                "Reconstruction Diameter"
            ]
        );
        assert_eq!(child_text(&sr, 7), "24.8 cm");
    }

    #[test]
    fn blank_contrast_is_skipped() {
        let mut src = minimal_mr_source();
        src.put(DataElement::new(
            tags::CONTRAST_BOLUS_AGENT,
            VR::LO,
            PrimitiveValue::from("   "),
        ));
        let sr = synthesize(&src, &SrOptions::default()).unwrap();
        assert_eq!(child_meanings(&sr).len(), 4);
    }

    #[test]
    fn flagged_attributes_are_stripped() {
        let mut src = minimal_mr_source();
        // private group
        src.put(DataElement::new(
            Tag(0x0009, 0x0010),
            VR::LO,
            PrimitiveValue::from("ACME 1.0"),
        ));
        // geometry band
        src.put(DataElement::new(
            Tag(0x0028, 0x0010),
            VR::US,
            PrimitiveValue::from(512_u16),
        ));
        // late element of the study group
        src.put(DataElement::new(
            Tag(0x0020, 0x0052),
            VR::UI,
            PrimitiveValue::from("1.2.3.4"),
        ));
        // kept: early element of the study group
        src.put(DataElement::new(
            Tag(0x0020, 0x000D),
            VR::UI,
            PrimitiveValue::from("1.2.3.5"),
        ));
        // pixel data
        src.put(DataElement::new(
            Tag(0x7FE0, 0x0010),
            VR::OW,
            PrimitiveValue::from(vec![0u8, 1, 2, 3]),
        ));

        let sr = synthesize(&src, &SrOptions::default()).unwrap();
        assert!(sr.element(Tag(0x0009, 0x0010)).is_err());
        assert!(sr.element(Tag(0x0028, 0x0010)).is_err());
        assert!(sr.element(Tag(0x0020, 0x0052)).is_err());
        assert!(sr.element(Tag(0x7FE0, 0x0010)).is_err());
        assert_eq!(
            sr.element(Tag(0x0020, 0x000D)).unwrap().to_str().unwrap(),
            "1.2.3.5"
        );
        assert_eq!(
            sr.element(tags::PATIENT_NAME).unwrap().to_str().unwrap(),
            "DOE^JANE"
        );
    }

    #[test]
    fn written_report_reopens() {
        let sr = synthesize(&minimal_mr_source(), &SrOptions::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.dcm");
        sr.write_to_file(&path).unwrap();

        let reopened = dicom_object::open_file(&path).unwrap();
        assert_eq!(
            reopened.element(tags::MODALITY).unwrap().to_str().unwrap(),
            "SR"
        );
        assert_eq!(child_meanings(&reopened).len(), 4);
    }
}
