use crate::analyzer::{Program, build};
use crate::ast::{Declaration, ExprKind, Literal, Statement, Storage};
use crate::builtins::BaseScope;
use crate::error::CompilerError;
use crate::parser::parse;
use crate::syntax::{AssignOp, BinaryOp, Span, Stage};
use crate::types::Type;
use crate::Compiler;

/// Helper to parse and analyze source code, returning the result
fn try_analyze(input: &str) -> Result<Program, CompilerError> {
    let _ = env_logger::builder().is_test(true).try_init();
    let unit = parse(input).expect("Parsing failed");
    build(&unit, &BaseScope::standard())
}

/// Helper to parse and analyze source code, expecting success
fn analyze(input: &str) -> Program {
    let result = try_analyze(input);
    if let Err(e) = &result {
        eprintln!("\n=== ANALYSIS ERROR ===");
        eprintln!("{:?}", e);
    }
    result.expect("Analysis should succeed")
}

fn analyze_err(input: &str) -> CompilerError {
    match try_analyze(input) {
        Ok(program) => panic!("Expected analysis to fail, got {:#?}", program.functions),
        Err(e) => e,
    }
}

/// Full compile including stage resolution, returning only the error
fn compile_err(input: &str) -> CompilerError {
    let _ = env_logger::builder().is_test(true).try_init();
    match Compiler::new().compile(input) {
        Ok(shader) => panic!("Expected compile to fail, got {:#?}", shader),
        Err(e) => e,
    }
}

#[test]
fn test_forward_references_resolve() {
    let program = analyze(
        "float a() { return b() * scale; }\n\
         float b() { return 1.0; }\n\
         const float scale = 0.5;",
    );
    assert_eq!(program.functions.len(), 2);
    assert_eq!(program.declarations["scale"].storage, Storage::Const);
}

#[test]
fn test_unknown_identifier_reported_at_reference() {
    let err = analyze_err("float known = 1.0;\nfloat f() {\n  return missing;\n}");
    assert_eq!(err, CompilerError::UnknownIdentifier("missing".to_string(), Some(Span::new(3, 10))));
}

#[test]
fn test_unknown_function_reported_at_callee() {
    let err = analyze_err("float f() { return nothing(1.0); }");
    assert_eq!(err, CompilerError::UnknownIdentifier("nothing".to_string(), Some(Span::new(1, 20))));
}

#[test]
fn test_initializer_type_mismatch() {
    let err = analyze_err("float x = 1;");
    assert!(matches!(err, CompilerError::TypeMismatch(..)));
    assert_eq!(err.span(), Some(Span::new(1, 11)));
}

#[test]
fn test_global_initializers_follow_declaration_order() {
    let program = analyze(
        "const float base = 2.0;\n\
         float scaled = base * 2.0;\n\
         float half() { return scaled * 0.5; }\n\
         float h = half();",
    );
    assert_eq!(program.declarations.len(), 3);

    // A local in the called function is not the global of the same name
    analyze("float g() { float x = 1.0; return x; }\nfloat x = g();");
}

#[test]
fn test_self_referencing_initializer() {
    let err = analyze_err("float a = a;");
    assert!(matches!(err, CompilerError::InvalidUsage(..)));
    assert_eq!(err.span(), Some(Span::new(1, 11)));
}

#[test]
fn test_cyclic_initializers() {
    let err = analyze_err("float b = c;\nfloat c = b;");
    assert!(matches!(err, CompilerError::InvalidUsage(ref msg, _) if msg.contains("'c'")));
    assert_eq!(err.span(), Some(Span::new(1, 11)));

    // Through a function that reads the global being defined
    let err = analyze_err("float f() { return g; }\nfloat g = f() + 1.0;");
    assert!(matches!(err, CompilerError::InvalidUsage(..)));
    assert_eq!(err.span(), Some(Span::new(2, 11)));

    let err = analyze_err("float f() { return k(); }\nfloat k() { return late; }\nfloat early = f();\nfloat late = 1.0;");
    assert!(matches!(err, CompilerError::InvalidUsage(ref msg, _) if msg.contains("'late'")));
    assert_eq!(err.span(), Some(Span::new(3, 15)));
}

#[test]
fn test_no_implicit_widening() {
    assert!(matches!(
        analyze_err("int i = 1;\nfloat f() { return i; }"),
        CompilerError::TypeMismatch(..)
    ));
    assert!(matches!(
        analyze_err("float f() { return 1.0 + 1; }"),
        CompilerError::TypeMismatch(..)
    ));
}

#[test]
fn test_duplicate_globals() {
    let err = analyze_err("uniform float u;\nuniform vec2 u;");
    assert_eq!(err, CompilerError::DuplicateDeclaration("u".to_string(), Some(Span::new(2, 14))));

    let err = analyze_err("float f;\nvoid f() {}");
    assert_eq!(err, CompilerError::DuplicateDeclaration("f".to_string(), Some(Span::new(2, 6))));
}

#[test]
fn test_duplicate_local_in_same_block() {
    let err = analyze_err("void f() {\n  float x = 1.0;\n  float x = 2.0;\n}");
    assert_eq!(err, CompilerError::DuplicateDeclaration("x".to_string(), Some(Span::new(3, 9))));
}

#[test]
fn test_parameter_cannot_be_redeclared_in_body() {
    assert!(matches!(
        analyze_err("void f(float a) { float a = 1.0; }"),
        CompilerError::DuplicateDeclaration(..)
    ));
    assert!(matches!(
        analyze_err("void f(float a, vec2 a) { }"),
        CompilerError::DuplicateDeclaration(..)
    ));
}

#[test]
fn test_shadowing_in_inner_block() {
    analyze("void f() {\n  float x = 1.0;\n  { float x = 2.0; x = x + 1.0; }\n  x = 3.0;\n}");
    analyze("uniform float t;\nfloat f() { float t = 2.0; return t; }");
    analyze("void f() { for (int i = 0; i < 2; i++) { } for (int i = 0; i < 2; i++) { } }");
}

#[test]
fn test_inner_block_binding_is_dropped() {
    let err = analyze_err("float f() {\n  { float inner = 1.0; }\n  return inner;\n}");
    assert_eq!(err, CompilerError::UnknownIdentifier("inner".to_string(), Some(Span::new(3, 10))));
}

#[test]
fn test_missing_return_value() {
    let err = analyze_err("float f(bool c) { if (c) { return 1.0; } }");
    assert!(matches!(err, CompilerError::InvalidUsage(..)));
    assert_eq!(err.span(), Some(Span::new(1, 7)));
    analyze("float f(bool c) { if (c) { return 1.0; } else { return 2.0; } }");
}

#[test]
fn test_return_type_rules() {
    assert!(matches!(analyze_err("int f() { return 1.0; }"), CompilerError::TypeMismatch(..)));
    assert!(matches!(analyze_err("void f() { return 1; }"), CompilerError::TypeMismatch(..)));
    assert!(matches!(analyze_err("int f() { return; }"), CompilerError::TypeMismatch(..)));
    analyze("void f() { return; }");
}

#[test]
fn test_user_function_calls() {
    analyze("float f(float x) { return x; }\nfloat g() { return f(2.0); }");
    assert!(matches!(
        analyze_err("float f(float x) { return x; }\nfloat g() { return f(1); }"),
        CompilerError::TypeMismatch(..)
    ));
    assert!(matches!(
        analyze_err("float f(float x) { return x; }\nfloat g() { return f(1.0, 2.0); }"),
        CompilerError::TypeMismatch(..)
    ));
    assert!(matches!(
        analyze_err("float x = 1.0;\nfloat g() { return x(1.0); }"),
        CompilerError::InvalidUsage(..)
    ));
}

#[test]
fn test_intrinsic_overloads() {
    analyze("float g(vec3 a) { return length(a) + dot(a, a); }");
    analyze("vec3 g(vec3 a, vec3 b) { return mix(a, b, 0.5) + clamp(a, 0.0, 1.0); }");
    assert!(matches!(analyze_err("float g(vec3 a) { return dot(a, 1.0); }"), CompilerError::TypeMismatch(..)));
}

#[test]
fn test_void_calls() {
    let program = analyze("void g() {}\nvoid f() { g(); }");
    let body = &program.functions["f"].body.statements;
    assert!(matches!(body[0], Statement::VoidCall { .. }));

    let err = analyze_err("void g() {}\nfloat f() { return g(); }");
    assert!(matches!(err, CompilerError::TypeMismatch(..)));
    assert_eq!(err.span(), Some(Span::new(2, 20)));
}

#[test]
fn test_constructors() {
    analyze("vec4 f(vec3 c) { return vec4(c, 1.0); }");
    analyze("mat2 f() { return mat2(vec2(1.0, 0.0), vec2(0.0, 1.0)); }");
    analyze("float[3] weights = float[3](1.0, 2.0, 3.0);");
    analyze("vec4 f() { return vec4(1); }");
    analyze("ivec4 f(vec4 v) { return ivec4(v); }");
    assert!(matches!(analyze_err("vec4 f() { return vec4(1.0, 2.0); }"), CompilerError::TypeMismatch(..)));
    assert!(matches!(analyze_err("float[3] w = float[3](1.0, 2.0);"), CompilerError::TypeMismatch(..)));
}

#[test]
fn test_expressions_carry_types() {
    let program = analyze("vec3 f(vec3 a) { return a * 2.0; }");
    match &program.functions["f"].body.statements[0] {
        Statement::Return { value: Some(value), .. } => {
            assert_eq!(value.ty, Type::vec(3));
            match &value.kind {
                ExprKind::Binary { op, lhs, rhs } => {
                    assert_eq!(*op, BinaryOp::Mul);
                    assert_eq!(lhs.ty, Type::vec(3));
                    assert_eq!(rhs.ty, Type::FLOAT);
                    assert!(matches!(lhs.kind, ExprKind::Variable { storage: Storage::Parameter, .. }));
                }
                other => panic!("expected binary, got {:?}", other),
            }
        }
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn test_swizzles_and_indexing() {
    analyze("vec2 f(vec4 v) { vec4 w = v; w.xy = v.zw; return w.yx; }");
    analyze("vec4 f(mat4 m) { return m[0]; }");
    analyze("float f(float[3] a) { return a[2]; }");
    assert!(matches!(analyze_err("void f(vec4 v) { v.xx = vec2(1.0); }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(analyze_err("float f(vec2 v) { return v.z; }"), CompilerError::TypeMismatch(..)));
    assert!(matches!(analyze_err("float f(float[3] a) { return a[3]; }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(analyze_err("float f(float[3] a) { return a[-1]; }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(analyze_err("float f(float[3] a) { return a[1.0]; }"), CompilerError::TypeMismatch(..)));
    assert!(matches!(analyze_err("float f(float a) { return a[0]; }"), CompilerError::TypeMismatch(..)));
}

#[test]
fn test_increment_statements() {
    let program = analyze("void f() { float x = 0.0; int i = 0; x++; i--; }");
    let body = &program.functions["f"].body.statements;
    match &body[2] {
        Statement::Assign { op, value, .. } => {
            assert_eq!(*op, AssignOp::Compound(BinaryOp::Add));
            assert_eq!(value.kind, ExprKind::Literal(Literal::Float(1.0)));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
    match &body[3] {
        Statement::Assign { op, value, .. } => {
            assert_eq!(*op, AssignOp::Compound(BinaryOp::Sub));
            assert_eq!(value.ty, Type::INT);
        }
        other => panic!("expected assignment, got {:?}", other),
    }
    assert!(matches!(analyze_err("void f() { bool b = true; b++; }"), CompilerError::TypeMismatch(..)));
}

#[test]
fn test_compound_assignment() {
    analyze("void f() { vec3 v = vec3(1.0); v *= 2.0; v += vec3(0.5); }");
    assert!(matches!(
        analyze_err("void f() { float x = 1.0; x += vec3(1.0); }"),
        CompilerError::TypeMismatch(..)
    ));
}

#[test]
fn test_storage_rules_outside_stages() {
    assert!(matches!(analyze_err("uniform float u;\nvoid f() { u = 1.0; }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(analyze_err("const float k = 1.0;\nvoid f() { k = 2.0; }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(analyze_err("const float k;"), CompilerError::InvalidUsage(..)));
    assert!(matches!(analyze_err("uniform float u = 1.0;"), CompilerError::InvalidUsage(..)));
    assert!(matches!(analyze_err("varying vec3 v = vec3(1.0);"), CompilerError::InvalidUsage(..)));

    let err = analyze_err("varying vec3 v;\nvoid f() { v = vec3(1.0); }");
    assert!(matches!(err, CompilerError::InvalidUsage(..)));
    assert_eq!(err.span(), Some(Span::new(2, 12)));
    assert!(matches!(
        analyze_err("vec4 f() { return out_Position; }"),
        CompilerError::InvalidUsage(..)
    ));
    assert!(matches!(analyze_err("in vec3 a;\nvec3 b = a;"), CompilerError::InvalidUsage(..)));
}

#[test]
fn test_control_flow_rules() {
    assert!(matches!(analyze_err("void f() { break; }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(analyze_err("void f() { continue; }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(analyze_err("void f() { discard; }"), CompilerError::InvalidUsage(..)));
    analyze("void f() { for (int i = 0; i < 4; i++) { if (i == 2) { break; } continue; } }");
    analyze("void f() { float x = 0.0; while (x < 1.0) { x += 0.25; } }");

    let err = analyze_err("void f() { if (1) { } }");
    assert!(matches!(err, CompilerError::TypeMismatch(..)));
    assert_eq!(err.span(), Some(Span::new(1, 16)));
}

#[test]
fn test_type_names_and_unknown_types() {
    assert!(matches!(analyze_err("float vec3 = 1.0;"), CompilerError::InvalidUsage(..)));
    assert_eq!(
        analyze_err("uniform sampler2D tex;"),
        CompilerError::UnknownIdentifier("sampler2D".to_string(), Some(Span::new(1, 9)))
    );
}

#[test]
fn test_restating_predefined_globals() {
    let program = analyze("vec4 out_Position;\nvarying vec4 varying_Fragment;");
    assert_eq!(program.declarations["out_Position"].storage, Storage::Output(Stage::Vertex));
    assert_eq!(
        program.declarations["varying_Fragment"].storage,
        Storage::Output(Stage::Fragment)
    );

    let err = analyze_err("vec3 out_Position;");
    assert!(matches!(err, CompilerError::TypeMismatch(..)));
    assert_eq!(err.span(), Some(Span::new(1, 1)));
    assert!(matches!(analyze_err("uniform vec4 out_Position;"), CompilerError::InvalidUsage(..)));
}

#[test]
fn test_predefined_globals_are_bound() {
    let program = analyze("");
    for name in ["out_Position", "varying_Fragment"] {
        match program.global_binding(name) {
            Some(Declaration::Variable(var)) => {
                assert_eq!(var.ty, Type::vec(4));
                assert!(var.storage.is_exported());
            }
            other => panic!("expected predefined variable {}, got {:?}", name, other),
        }
    }
}

#[test]
fn test_stages_and_properties_are_collected() {
    let program = analyze("#[name = \"unlit\"]\n#[queue = 10]\nfragment { }\nvertex { }");
    assert_eq!(
        program.properties.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect::<Vec<_>>(),
        vec![("name", "unlit"), ("queue", "10")]
    );
    assert!(program.stages.contains_key(&Stage::Vertex));
    assert!(program.stages.contains_key(&Stage::Fragment));

    let err = analyze_err("fragment { }\nfragment { }");
    assert_eq!(err, CompilerError::DuplicateDeclaration("fragment".to_string(), Some(Span::new(2, 1))));
    assert!(matches!(analyze_err("#[a]\n#[a = 2]"), CompilerError::DuplicateDeclaration(..)));
}

#[test]
fn test_base_scope_entries_resolve() {
    let source = "float f() { return u_time; }";
    assert!(matches!(analyze_err(source), CompilerError::UnknownIdentifier(..)));

    let base = BaseScope::standard().with_uniform("u_time", Type::FLOAT);
    let compiler = Compiler::with_base_scope(base);
    let program = compiler.analyze(source).expect("base uniform should resolve");
    assert!(program.functions.contains_key("f"));
}

#[test]
fn test_stage_access_rules() {
    let err = compile_err("in vec3 a_pos;\nvertex { out_Position = vec4(a_pos, 1.0); }\nfragment { varying_Fragment = vec4(a_pos, 1.0); }");
    assert!(matches!(err, CompilerError::InvalidUsage(..)));
    assert_eq!(err.span(), Some(Span::new(3, 36)));

    assert!(matches!(compile_err("fragment { out_Position = vec4(1.0); }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(
        compile_err("varying vec3 v;\nfragment { v = vec3(1.0); }"),
        CompilerError::InvalidUsage(..)
    ));
    assert!(matches!(compile_err("fragment(vec3 c) { c = vec3(0.0); }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(compile_err("in vec3 a;\nvertex { a = vec3(0.0); }\nfragment { }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(compile_err("vertex { discard; }\nfragment { }"), CompilerError::InvalidUsage(..)));
    assert!(matches!(compile_err("fragment { return 1.0; }"), CompilerError::InvalidUsage(..)));
}

#[test]
fn test_stage_interfaces_are_recorded() {
    let err = compile_err(
        "in vec3 a_pos;\n\
         varying vec3 v_color;\n\
         vertex { v_color = a_pos; out_Position = vec4(a_pos, 1.0); }\n\
         fragment(vec2 v_uv) { varying_Fragment = vec4(v_color * v_uv.x, 1.0); }",
    );
    assert!(matches!(err, CompilerError::UnlinkedVarying(..)));

    let shader = Compiler::new()
        .compile(
            "in vec3 a_pos;\n\
             varying vec3 v_color;\n\
             vertex { v_color = a_pos; v_uv = a_pos.xy; out_Position = vec4(a_pos, 1.0); }\n\
             fragment(vec2 v_uv) { if (v_uv.x < 0.0) { discard; } varying_Fragment = vec4(v_color, 1.0); }",
        )
        .expect("shader should compile");

    let fragment = shader.shader_fragment().expect("fragment stage");
    let names: Vec<_> = fragment.inputs.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["v_uv", "v_color"]);
    assert!(fragment.output("varying_Fragment").is_some());

    let vertex = shader.shader_vertex().expect("vertex stage");
    assert_eq!(vertex.input("a_pos").map(|v| v.storage), Some(Storage::Attribute));
    let outputs: Vec<_> = vertex.outputs.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(outputs, vec!["v_color", "v_uv", "out_Position"]);
}
