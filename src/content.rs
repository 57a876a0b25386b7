use dicom_core::value::DataSetSequence;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;

use crate::coding::CodedConcept;

/// The only relationship type used by this document template.
const RELATIONSHIP_CONTAINS: &str = "CONTAINS";

const VALUE_TYPE_TEXT: &str = "TEXT";
const VALUE_TYPE_CONTAINER: &str = "CONTAINER";
const CONTINUITY_SEPARATE: &str = "SEPARATE";

fn base_item(value_type: &str, concept: &CodedConcept) -> InMemDicomObject {
    let mut item = InMemDicomObject::new_empty();
    item.put(DataElement::new(
        tags::RELATIONSHIP_TYPE,
        VR::CS,
        PrimitiveValue::from(RELATIONSHIP_CONTAINS),
    ));
    item.put(DataElement::new(
        tags::VALUE_TYPE,
        VR::CS,
        PrimitiveValue::from(value_type),
    ));
    item.put(DataElement::new(
        tags::CONCEPT_NAME_CODE_SEQUENCE,
        VR::SQ,
        DataSetSequence::from(vec![concept.to_item()]),
    ));
    item
}

/// Append one TEXT content item to `parent`.
///
/// The payload is stored verbatim in TextValue; callers are responsible for
/// passing only scalar text.
pub fn append_text(parent: &mut Vec<InMemDicomObject>, concept: &CodedConcept, payload: &str) {
    let mut item = base_item(VALUE_TYPE_TEXT, concept);
    item.put(DataElement::new(
        tags::TEXT_VALUE,
        VR::UT,
        PrimitiveValue::from(payload),
    ));
    parent.push(item);
}

/// Build a CONTAINER content item owning `children` as its content sequence,
/// with continuity of content SEPARATE.
pub fn container_item(concept: &CodedConcept, children: Vec<InMemDicomObject>) -> InMemDicomObject {
    let mut item = base_item(VALUE_TYPE_CONTAINER, concept);
    item.put(DataElement::new(
        tags::CONTINUITY_OF_CONTENT,
        VR::CS,
        PrimitiveValue::from(CONTINUITY_SEPARATE),
    ));
    item.put(DataElement::new(
        tags::CONTENT_SEQUENCE,
        VR::SQ,
        DataSetSequence::from(children),
    ));
    item
}
