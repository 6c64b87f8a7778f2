#![allow(dead_code)]

pub mod assembler;

use assembler::{ClassAssembler, Insn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "sig_sniffer_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_file(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) -> anyhow::Result<()> {
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

/// A tiny "runtime": Object, String, System.out and PrintStream.println.
pub fn write_baseline(dir: &Path) -> anyhow::Result<()> {
    write_file(
        &dir.join("java/lang/Object.class"),
        &ClassAssembler::new("java/lang/Object")
            .no_super_class()
            .method("<init>", "()V", &[Insn::Return])
            .abstract_method("hashCode", "()I")
            .abstract_method("toString", "()Ljava/lang/String;")
            .build(),
    )?;
    write_file(
        &dir.join("java/lang/String.class"),
        &ClassAssembler::new("java/lang/String")
            .interface("java/lang/CharSequence")
            .abstract_method("length", "()I")
            .build(),
    )?;
    write_file(
        &dir.join("java/lang/System.class"),
        &ClassAssembler::new("java/lang/System")
            .field("out", "Ljava/io/PrintStream;")
            .build(),
    )?;
    write_jar(
        &dir.join("io.jar"),
        &[
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
            (
                "java/io/PrintStream.class",
                ClassAssembler::new("java/io/PrintStream")
                    .abstract_method("println", "(Ljava/lang/String;)V")
                    .build(),
            ),
        ],
    )?;
    Ok(())
}

/// `Hello` prints via System.out and, when `uses_missing` is set, also
/// calls `String.isBlank()` which the baseline lacks.
pub fn hello_class(uses_missing: bool) -> Vec<u8> {
    let mut code = vec![
        Insn::Line(5),
        Insn::GetStatic("java/lang/System", "out", "Ljava/io/PrintStream;"),
        Insn::AConstNull,
        Insn::InvokeVirtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V"),
    ];
    if uses_missing {
        code.push(Insn::Line(6));
        code.push(Insn::AConstNull);
        code.push(Insn::InvokeVirtual("java/lang/String", "isBlank", "()Z"));
        code.push(Insn::Pop);
    }
    code.push(Insn::Return);

    ClassAssembler::new("com/acme/Hello")
        .method("<init>", "()V", &[Insn::InvokeSpecial("java/lang/Object", "<init>", "()V"), Insn::Return])
        .method("main", "()V", &code)
        .source_file("Hello.java")
        .build()
}
