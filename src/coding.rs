use std::borrow::Cow;

use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;

/// A controlled-vocabulary term: code value, coding scheme designator, and
/// code meaning.
///
/// The code value and scheme obey a both-or-neither rule: a concept with no
/// code value carries no scheme either. The meaning is always present, even
/// when empty. No validation against a terminology registry is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedConcept {
    value: Cow<'static, str>,
    scheme: Cow<'static, str>,
    meaning: Cow<'static, str>,
}

// Document title concepts (LOINC).
pub static CT_REPORT: CodedConcept = CodedConcept::fixed("18747-6", "LN", "CT Report");
pub static MRI_REPORT: CodedConcept = CodedConcept::fixed("18755-9", "LN", "MRI Report");

// Patient Characteristics section and its content items (DCM).
pub static PATIENT_CHARACTERISTICS: CodedConcept =
    CodedConcept::fixed("121118", "DCM", "Patient Characteristics");
pub static INSTITUTION_NAME: CodedConcept =
    CodedConcept::fixed("121009", "DCM", "Institution Name");
pub static SUBJECT_NAME: CodedConcept = CodedConcept::fixed("121029", "DCM", "Subject Name");
pub static SUBJECT_ID: CodedConcept = CodedConcept::fixed("121030", "DCM", "Subject ID");
pub static STUDY_DATE: CodedConcept = CodedConcept::fixed("111060", "DCM", "Study Date");
pub static PROCEDURE_DESCRIPTION: CodedConcept =
    CodedConcept::fixed("121065", "DCM", "Procedure Description");
pub static CONTRAST_ADMINISTERED: CodedConcept =
    CodedConcept::fixed("122086", "DCM", "Contrast Administered");
// No DCM code exists for magnetic field strength.
pub static MAGNETIC_FIELD_STRENGTH: CodedConcept =
    CodedConcept::fixed("", "", "Magnetic Field Strength");
// 113961 is nominally Reconstruction Algorithm; kept for compatibility with
// the reports consumed downstream.
pub static RECONSTRUCTION_DIAMETER: CodedConcept =
    CodedConcept::fixed("113961", "DCM", "Reconstruction Diameter");

impl CodedConcept {
    /// Build a concept from arbitrary strings, applying the both-or-neither
    /// rule for the code value and scheme.
    pub fn new(value: &str, scheme: &str, meaning: &str) -> Self {
        if value.is_empty() {
            CodedConcept {
                value: Cow::Borrowed(""),
                scheme: Cow::Borrowed(""),
                meaning: Cow::Owned(meaning.to_owned()),
            }
        } else {
            CodedConcept {
                value: Cow::Owned(value.to_owned()),
                scheme: Cow::Owned(scheme.to_owned()),
                meaning: Cow::Owned(meaning.to_owned()),
            }
        }
    }

    const fn fixed(value: &'static str, scheme: &'static str, meaning: &'static str) -> Self {
        CodedConcept {
            value: Cow::Borrowed(value),
            scheme: Cow::Borrowed(scheme),
            meaning: Cow::Borrowed(meaning),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn meaning(&self) -> &str {
        &self.meaning
    }

    /// Render the concept as a single code-sequence item.
    ///
    /// CodeValue and CodingSchemeDesignator are written only when a code
    /// value exists; CodeMeaning is always written.
    pub fn to_item(&self) -> InMemDicomObject {
        let mut item = InMemDicomObject::new_empty();
        if !self.value.is_empty() {
            item.put(DataElement::new(
                tags::CODE_VALUE,
                VR::SH,
                PrimitiveValue::from(self.value.as_ref()),
            ));
            item.put(DataElement::new(
                tags::CODING_SCHEME_DESIGNATOR,
                VR::SH,
                PrimitiveValue::from(self.scheme.as_ref()),
            ));
        }
        item.put(DataElement::new(
            tags::CODE_MEANING,
            VR::LO,
            PrimitiveValue::from(self.meaning.as_ref()),
        ));
        item
    }
}
