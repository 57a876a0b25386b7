use dicom_core::Tag;

/// Study/series identification group; elements past
/// [`STUDY_GROUP_LAST_KEPT_ELEMENT`] are stripped.
const STUDY_GROUP: u16 = 0x0020;
const STUDY_GROUP_LAST_KEPT_ELEMENT: u16 = 0x0013;

/// Exclusive bounds of the acquisition/image-geometry group band.
const GEOMETRY_BAND_LOW: u16 = 0x0020;
const GEOMETRY_BAND_HIGH: u16 = 0x0032;

/// Last group retained in the report; everything above holds overlay,
/// curve, and pixel-adjacent data.
const LAST_KEPT_GROUP: u16 = 0x0040;

/// Decide whether an attribute is stripped from the report data set.
///
/// Purely a function of the tag, never of the value. An attribute is
/// removed when its group is odd (private groups), when the group falls in
/// the acquisition/geometry band, when it is a late element of the study
/// identification group, or when the group lies above [`LAST_KEPT_GROUP`].
pub fn should_remove(tag: Tag) -> bool {
    let group = tag.group();
    let element = tag.element();
    (group & 1) != 0
        || (group > GEOMETRY_BAND_LOW && group < GEOMETRY_BAND_HIGH)
        || (group == STUDY_GROUP && element > STUDY_GROUP_LAST_KEPT_ELEMENT)
        || group > LAST_KEPT_GROUP
}
