//! Helpers over JVM type descriptors and member signatures.
//!
//! Descriptors are otherwise treated as opaque strings; these helpers only
//! pull out the class names a descriptor mentions and render signatures in
//! source form for diagnostics.

/// Returns the class named by a field descriptor, looking through array
/// dimensions. Primitive types yield `None`.
pub fn field_type_class(descriptor: &str) -> Option<&str> {
    let element = descriptor.trim_start_matches('[');
    element.strip_prefix('L')?.strip_suffix(';')
}

/// Returns the raw return-type part of a method descriptor.
pub fn return_type(descriptor: &str) -> Option<&str> {
    descriptor
        .starts_with('(')
        .then(|| descriptor.rsplit_once(')'))
        .flatten()
        .map(|(_, ret)| ret)
}

/// Returns the class named by a method descriptor's return type.
pub fn return_type_class(descriptor: &str) -> Option<&str> {
    return_type(descriptor).and_then(field_type_class)
}

/// Constructors and static initializers are written `<init>` / `<clinit>`.
pub fn is_initializer(signature: &str) -> bool {
    signature.starts_with('<')
}

/// Converts a dotted or slashed type name to an annotation type
/// descriptor, e.g. `com.foo.Bar` to `Lcom/foo/Bar;`.
pub fn to_annotation_descriptor(type_name: &str) -> String {
    format!("L{};", type_name.replace('.', "/"))
}

/// Renders an owner (and optional member signature) the way it would be
/// written in Java source.
pub fn to_source_form(owner: &str, signature: Option<&str>) -> String {
    let source_owner = source_type_name(owner);
    let Some(signature) = signature else {
        return source_owner;
    };

    if let Some((name, descriptor)) = signature.split_once('#') {
        let field_type = parse_source_type(descriptor)
            .map(|(ty, _)| ty)
            .unwrap_or_else(|| format!("{{{descriptor}}}"));
        return format!("{field_type} {source_owner}.{name}");
    }

    if let (Some(lparen), Some(rparen)) = (signature.find('('), signature.find(')')) {
        if lparen < rparen {
            let name = &signature[..lparen];
            let ret = &signature[rparen + 1..];
            let ret = if ret == "V" {
                "void".to_string()
            } else {
                parse_source_type(ret)
                    .map(|(ty, _)| ty)
                    .unwrap_or_else(|| format!("{{{ret}}}"))
            };

            let mut args = Vec::new();
            let mut rest = &signature[lparen + 1..rparen];
            while !rest.is_empty() {
                match parse_source_type(rest) {
                    Some((ty, tail)) => {
                        args.push(ty);
                        rest = tail;
                    }
                    None => {
                        args.push(format!("{{{rest}}}"));
                        break;
                    }
                }
            }

            return format!("{ret} {source_owner}.{name}({})", args.join(", "));
        }
    }

    format!("{{{owner}:{signature}}}")
}

/// Parses one type off the front of a descriptor, returning its source
/// form and the unparsed tail.
fn parse_source_type(descriptor: &str) -> Option<(String, &str)> {
    let element = descriptor.trim_start_matches('[');
    let dimensions = descriptor.len() - element.len();

    let (base, rest) = match element.as_bytes().first()? {
        b'L' => {
            let end = element.find(';')?;
            (source_type_name(&element[1..end]), &element[end + 1..])
        }
        b'B' => ("byte".to_string(), &element[1..]),
        b'C' => ("char".to_string(), &element[1..]),
        b'D' => ("double".to_string(), &element[1..]),
        b'F' => ("float".to_string(), &element[1..]),
        b'I' => ("int".to_string(), &element[1..]),
        b'J' => ("long".to_string(), &element[1..]),
        b'S' => ("short".to_string(), &element[1..]),
        b'Z' => ("boolean".to_string(), &element[1..]),
        _ => return None,
    };

    Some((format!("{base}{}", "[]".repeat(dimensions)), rest))
}

/// `java/lang/String` becomes `String`, `java/util/Map$Entry` becomes
/// `java.util.Map.Entry`.
fn source_type_name(internal: &str) -> String {
    let name = match internal.strip_prefix("java/lang/") {
        Some(simple) if !simple.contains('/') => simple,
        _ => internal,
    };
    name.replace(['/', '$'], ".")
}
