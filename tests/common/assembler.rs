//! Minimal class-file assembler for test fixtures.
//!
//! Produces structurally valid class files (no stack maps, so they would
//! not pass the JVM verifier) with exactly the constant pool entries,
//! members, annotations and instructions a test asks for.
#![allow(dead_code)]

use std::collections::HashMap;

const METAFACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";

pub enum Insn<'a> {
    /// Starts a new source line at the current code offset.
    Line(u16),
    GetStatic(&'a str, &'a str, &'a str),
    PutStatic(&'a str, &'a str, &'a str),
    GetField(&'a str, &'a str, &'a str),
    PutField(&'a str, &'a str, &'a str),
    InvokeVirtual(&'a str, &'a str, &'a str),
    InvokeSpecial(&'a str, &'a str, &'a str),
    InvokeStatic(&'a str, &'a str, &'a str),
    InvokeInterface(&'a str, &'a str, &'a str),
    New(&'a str),
    ANewArray(&'a str),
    CheckCast(&'a str),
    InstanceOf(&'a str),
    /// `invokedynamic` bootstrapped by `LambdaMetafactory.metafactory`.
    Lambda {
        name: &'a str,
        descriptor: &'a str,
        implementation: (&'a str, &'a str, &'a str),
    },
    AConstNull,
    Pop,
    Return,
    AReturn,
    Raw(Vec<u8>),
}

#[derive(Default)]
struct Pool {
    bytes: Vec<u8>,
    next: u16,
    cache: HashMap<Vec<u8>, u16>,
}

impl Pool {
    fn add(&mut self, entry: Vec<u8>, slots: u16) -> u16 {
        if let Some(index) = self.cache.get(&entry) {
            return *index;
        }
        let index = self.next;
        self.bytes.extend_from_slice(&entry);
        self.cache.insert(entry, index);
        self.next += slots;
        index
    }

    fn utf8(&mut self, text: &str) -> u16 {
        self.raw_utf8(text.as_bytes())
    }

    fn raw_utf8(&mut self, bytes: &[u8]) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        entry.extend_from_slice(bytes);
        self.add(entry, 1)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.add(tagged(7, &[name]), 1)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.add(tagged(12, &[name, descriptor]), 1)
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        self.add(tagged(tag, &[class, nat]), 1)
    }

    fn method_handle(&mut self, kind: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let member = self.member(10, owner, name, descriptor);
        let mut entry = vec![15, kind];
        entry.extend_from_slice(&member.to_be_bytes());
        self.add(entry, 1)
    }

    fn method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor = self.utf8(descriptor);
        self.add(tagged(16, &[descriptor]), 1)
    }

    fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let nat = self.name_and_type(name, descriptor);
        self.add(tagged(18, &[bootstrap, nat]), 1)
    }

    fn long(&mut self, value: i64) -> u16 {
        let mut entry = vec![5];
        entry.extend_from_slice(&value.to_be_bytes());
        self.add(entry, 2)
    }
}

fn tagged(tag: u8, indexes: &[u16]) -> Vec<u8> {
    let mut entry = vec![tag];
    for index in indexes {
        entry.extend_from_slice(&index.to_be_bytes());
    }
    entry
}

pub struct ClassAssembler {
    major: u16,
    minor: u16,
    access: u16,
    pool: Pool,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    annotations: Vec<String>,
    source_file: Option<String>,
    enclosing: Option<(u16, u16)>,
    bootstrap: Vec<(u16, Vec<u16>)>,
}

impl ClassAssembler {
    pub fn new(name: &str) -> Self {
        let mut pool = Pool {
            next: 1,
            ..Pool::default()
        };
        let this_class = pool.class(name);
        let super_class = pool.class("java/lang/Object");
        Self {
            major: 52,
            minor: 0,
            access: 0x0021,
            pool,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            source_file: None,
            enclosing: None,
            bootstrap: Vec::new(),
        }
    }

    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.major = major;
        self.minor = minor;
        self
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.super_class = self.pool.class(name);
        self
    }

    pub fn no_super_class(mut self) -> Self {
        self.super_class = 0;
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        let index = self.pool.class(name);
        self.interfaces.push(index);
        self
    }

    /// Adds a class-level annotation (type descriptor).
    pub fn annotation(mut self, descriptor: &str) -> Self {
        self.annotations.push(descriptor.to_string());
        self
    }

    pub fn source_file(mut self, name: &str) -> Self {
        self.source_file = Some(name.to_string());
        self
    }

    /// Marks this class as declared inside `class` (and `method`, given as
    /// name and descriptor), as javac does for local and anonymous classes.
    pub fn enclosing_method(mut self, class: &str, method: Option<(&str, &str)>) -> Self {
        let class = self.pool.class(class);
        let method = method.map_or(0, |(name, descriptor)| self.pool.name_and_type(name, descriptor));
        self.enclosing = Some((class, method));
        self
    }

    /// Adds a string constant whose Utf8 entry holds `bytes` verbatim, so
    /// tests can write modified UTF-8 that is not valid UTF-8.
    pub fn raw_string_constant(mut self, bytes: &[u8]) -> Self {
        let utf8 = self.pool.raw_utf8(bytes);
        self.pool.add(tagged(8, &[utf8]), 1);
        self
    }

    /// Adds a `long` constant, exercising two-slot pool entries.
    pub fn long_constant(mut self, value: i64) -> Self {
        self.pool.long(value);
        self
    }

    pub fn field(self, name: &str, descriptor: &str) -> Self {
        self.annotated_field(name, descriptor, &[])
    }

    pub fn annotated_field(mut self, name: &str, descriptor: &str, annotations: &[&str]) -> Self {
        let mut attributes = Vec::new();
        if !annotations.is_empty() {
            attributes.push(self.annotations_attribute(annotations));
        }
        let member = self.member(0x0002, name, descriptor, attributes);
        self.fields.push(member);
        self
    }

    pub fn method(self, name: &str, descriptor: &str, code: &[Insn<'_>]) -> Self {
        self.annotated_method(name, descriptor, &[], code)
    }

    pub fn annotated_method(
        mut self,
        name: &str,
        descriptor: &str,
        annotations: &[&str],
        code: &[Insn<'_>],
    ) -> Self {
        let mut attributes = Vec::new();
        if !annotations.is_empty() {
            attributes.push(self.annotations_attribute(annotations));
        }
        attributes.push(self.code_attribute(code));
        let member = self.member(0x0001, name, descriptor, attributes);
        self.methods.push(member);
        self
    }

    pub fn abstract_method(mut self, name: &str, descriptor: &str) -> Self {
        let member = self.member(0x0401, name, descriptor, Vec::new());
        self.methods.push(member);
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let mut attributes = Vec::new();
        if !self.annotations.is_empty() {
            let annotations = std::mem::take(&mut self.annotations);
            let refs: Vec<&str> = annotations.iter().map(String::as_str).collect();
            attributes.push(self.annotations_attribute(&refs));
        }
        if let Some(source) = self.source_file.take() {
            let index = self.pool.utf8(&source);
            attributes.push(self.attribute("SourceFile", &index.to_be_bytes()));
        }
        if let Some((class, method)) = self.enclosing.take() {
            let mut data = class.to_be_bytes().to_vec();
            data.extend_from_slice(&method.to_be_bytes());
            attributes.push(self.attribute("EnclosingMethod", &data));
        }
        if !self.bootstrap.is_empty() {
            let mut data = (self.bootstrap.len() as u16).to_be_bytes().to_vec();
            for (method, args) in &self.bootstrap {
                data.extend_from_slice(&method.to_be_bytes());
                data.extend_from_slice(&(args.len() as u16).to_be_bytes());
                for arg in args {
                    data.extend_from_slice(&arg.to_be_bytes());
                }
            }
            attributes.push(self.attribute("BootstrapMethods", &data));
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        out.extend_from_slice(&self.minor.to_be_bytes());
        out.extend_from_slice(&self.major.to_be_bytes());
        out.extend_from_slice(&self.pool.next.to_be_bytes());
        out.extend_from_slice(&self.pool.bytes);
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        for table in [&self.fields, &self.methods] {
            out.extend_from_slice(&(table.len() as u16).to_be_bytes());
            for member in table {
                out.extend_from_slice(member);
            }
        }
        out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            out.extend_from_slice(&attribute);
        }
        out
    }

    fn member(&mut self, access: u16, name: &str, descriptor: &str, attributes: Vec<Vec<u8>>) -> Vec<u8> {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        let mut out = Vec::new();
        out.extend_from_slice(&access.to_be_bytes());
        out.extend_from_slice(&name.to_be_bytes());
        out.extend_from_slice(&descriptor.to_be_bytes());
        out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            out.extend_from_slice(&attribute);
        }
        out
    }

    fn attribute(&mut self, name: &str, data: &[u8]) -> Vec<u8> {
        let name = self.pool.utf8(name);
        let mut out = name.to_be_bytes().to_vec();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    fn annotations_attribute(&mut self, descriptors: &[&str]) -> Vec<u8> {
        let mut data = (descriptors.len() as u16).to_be_bytes().to_vec();
        for descriptor in descriptors {
            let index = self.pool.utf8(descriptor);
            data.extend_from_slice(&index.to_be_bytes());
            data.extend_from_slice(&0u16.to_be_bytes());
        }
        self.attribute("RuntimeInvisibleAnnotations", &data)
    }

    fn code_attribute(&mut self, insns: &[Insn<'_>]) -> Vec<u8> {
        let mut code: Vec<u8> = Vec::new();
        let mut lines: Vec<(u16, u16)> = Vec::new();
        for insn in insns {
            let (opcode, index) = match insn {
                Insn::Line(line) => {
                    lines.push((code.len() as u16, *line));
                    continue;
                }
                Insn::GetStatic(o, n, d) => (0xb2, self.pool.member(9, o, n, d)),
                Insn::PutStatic(o, n, d) => (0xb3, self.pool.member(9, o, n, d)),
                Insn::GetField(o, n, d) => (0xb4, self.pool.member(9, o, n, d)),
                Insn::PutField(o, n, d) => (0xb5, self.pool.member(9, o, n, d)),
                Insn::InvokeVirtual(o, n, d) => (0xb6, self.pool.member(10, o, n, d)),
                Insn::InvokeSpecial(o, n, d) => (0xb7, self.pool.member(10, o, n, d)),
                Insn::InvokeStatic(o, n, d) => (0xb8, self.pool.member(10, o, n, d)),
                Insn::InvokeInterface(o, n, d) => {
                    let index = self.pool.member(11, o, n, d);
                    code.push(0xb9);
                    code.extend_from_slice(&index.to_be_bytes());
                    code.extend_from_slice(&[1, 0]);
                    continue;
                }
                Insn::New(name) => (0xbb, self.pool.class(name)),
                Insn::ANewArray(name) => (0xbd, self.pool.class(name)),
                Insn::CheckCast(name) => (0xc0, self.pool.class(name)),
                Insn::InstanceOf(name) => (0xc1, self.pool.class(name)),
                Insn::Lambda {
                    name,
                    descriptor,
                    implementation: (owner, method, method_descriptor),
                } => {
                    let bootstrap = self.pool.method_handle(
                        6,
                        "java/lang/invoke/LambdaMetafactory",
                        "metafactory",
                        METAFACTORY_DESCRIPTOR,
                    );
                    let sam = self.pool.method_type("()Ljava/lang/Object;");
                    let target = self.pool.method_handle(6, owner, method, method_descriptor);
                    let instantiated = self.pool.method_type(method_descriptor);
                    self.bootstrap.push((bootstrap, vec![sam, target, instantiated]));
                    let bsm_index = (self.bootstrap.len() - 1) as u16;
                    let index = self.pool.invoke_dynamic(bsm_index, name, descriptor);
                    code.push(0xba);
                    code.extend_from_slice(&index.to_be_bytes());
                    code.extend_from_slice(&[0, 0]);
                    continue;
                }
                Insn::AConstNull => {
                    code.push(0x01);
                    continue;
                }
                Insn::Pop => {
                    code.push(0x57);
                    continue;
                }
                Insn::Return => {
                    code.push(0xb1);
                    continue;
                }
                Insn::AReturn => {
                    code.push(0xb0);
                    continue;
                }
                Insn::Raw(bytes) => {
                    code.extend_from_slice(bytes);
                    continue;
                }
            };
            code.push(opcode);
            code.extend_from_slice(&index.to_be_bytes());
        }

        let mut data = Vec::new();
        data.extend_from_slice(&8u16.to_be_bytes()); // max_stack
        data.extend_from_slice(&8u16.to_be_bytes()); // max_locals
        data.extend_from_slice(&(code.len() as u32).to_be_bytes());
        data.extend_from_slice(&code);
        data.extend_from_slice(&0u16.to_be_bytes()); // exception table
        if lines.is_empty() {
            data.extend_from_slice(&0u16.to_be_bytes());
        } else {
            let mut table = (lines.len() as u16).to_be_bytes().to_vec();
            for (pc, line) in &lines {
                table.extend_from_slice(&pc.to_be_bytes());
                table.extend_from_slice(&line.to_be_bytes());
            }
            let attribute = self.attribute("LineNumberTable", &table);
            data.extend_from_slice(&1u16.to_be_bytes());
            data.extend_from_slice(&attribute);
        }
        self.attribute("Code", &data)
    }
}
