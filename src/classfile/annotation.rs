use super::DecodeError;
use super::constant_pool::ConstantPool;
use super::descriptor::to_annotation_descriptor;
use super::reader::ClassReader;

pub(crate) const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub(crate) const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";

const MAX_NESTING: usize = 64;

/// Annotation type names that exempt their scope from checking.
pub const IGNORE_REQUIREMENT_ANNOTATION: &str =
    "org.codehaus.mojo.animal_sniffer.IgnoreJRERequirement";

/// Older package spelling of [`IGNORE_REQUIREMENT_ANNOTATION`].
pub const LEGACY_IGNORE_REQUIREMENT_ANNOTATION: &str = "org.jvnet.animal_sniffer.IgnoreJRERequirement";

/// The set of annotation type descriptors treated as suppression markers.
///
/// Matching is exact, case-sensitive comparison of type descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionMarkers {
    descriptors: Vec<String>,
}

impl Default for SuppressionMarkers {
    fn default() -> Self {
        Self::from_type_names([
            IGNORE_REQUIREMENT_ANNOTATION,
            LEGACY_IGNORE_REQUIREMENT_ANNOTATION,
        ])
    }
}

impl SuppressionMarkers {
    /// Builds a marker set from dotted or slashed annotation type names.
    /// This replaces the defaults; include them explicitly to keep them.
    pub fn from_type_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut descriptors: Vec<String> = names
            .into_iter()
            .map(|name| to_annotation_descriptor(name.as_ref()))
            .collect();
        descriptors.sort();
        descriptors.dedup();
        Self { descriptors }
    }

    pub fn is_marker(&self, descriptor: &str) -> bool {
        self.descriptors.iter().any(|d| d == descriptor)
    }

    /// True when any of `annotations` (type descriptors) is a marker.
    pub fn any_marker<S: AsRef<str>>(&self, annotations: &[S]) -> bool {
        annotations.iter().any(|a| self.is_marker(a.as_ref()))
    }
}

pub(crate) fn is_annotation_attribute(name: &str) -> bool {
    name == RUNTIME_VISIBLE_ANNOTATIONS || name == RUNTIME_INVISIBLE_ANNOTATIONS
}

/// Collects the type descriptors of the top-level annotations in a
/// `Runtime{Visible,Invisible}Annotations` attribute payload.
pub(crate) fn parse_annotations(
    data: &[u8],
    pool: &ConstantPool,
    out: &mut Vec<String>,
) -> Result<(), DecodeError> {
    let mut reader = ClassReader::new(data);
    let count = reader.read_u2()?;
    for _ in 0..count {
        let type_index = reader.read_u2()?;
        out.push(pool.utf8(type_index)?.to_string());
        skip_element_pairs(&mut reader, 1)?;
    }
    Ok(())
}

fn skip_element_pairs(reader: &mut ClassReader<'_>, depth: usize) -> Result<(), DecodeError> {
    let pairs = reader.read_u2()?;
    for _ in 0..pairs {
        reader.read_u2()?; // element_name_index
        skip_element_value(reader, depth)?;
    }
    Ok(())
}

fn skip_element_value(reader: &mut ClassReader<'_>, depth: usize) -> Result<(), DecodeError> {
    if depth > MAX_NESTING {
        return Err(DecodeError::NestingTooDeep(MAX_NESTING));
    }

    match reader.read_u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => reader.skip(2),
        b'e' => reader.skip(4),
        b'@' => {
            reader.read_u2()?; // type_index
            skip_element_pairs(reader, depth + 1)
        }
        b'[' => {
            let values = reader.read_u2()?;
            for _ in 0..values {
                skip_element_value(reader, depth + 1)?;
            }
            Ok(())
        }
        _ => Err(DecodeError::MalformedAttribute("annotation")),
    }
}
