use crate::Compiler;
use crate::analyzer::build;
use crate::builtins::BaseScope;
use crate::error::CompilerError;
use crate::linker::link;
use crate::parser::parse;
use crate::shader::CompiledShader;
use crate::syntax::{Span, Stage};
use crate::types::Type;

fn try_link(input: &str) -> Result<CompiledShader, CompilerError> {
    let _ = env_logger::builder().is_test(true).try_init();
    let unit = parse(input).expect("Parsing failed");
    let program = build(&unit, &BaseScope::standard()).expect("Analysis failed");
    link(program)
}

fn linked(input: &str) -> CompiledShader {
    match try_link(input) {
        Ok(shader) => shader,
        Err(e) => panic!("Linking failed: {:?}", e),
    }
}

fn output_names(shader: &CompiledShader) -> Vec<(&str, Stage)> {
    shader.outputs().iter().map(|o| (o.name.as_str(), o.stage)).collect()
}

#[test]
fn test_missing_fragment_stage_points_at_vertex_block() {
    let err = try_link("uniform mat4 u_mvp;\nvertex {\n  out_Position = u_mvp * vec4(1.0);\n}").unwrap_err();
    assert_eq!(err, CompilerError::MissingFragmentStage(Some(Span::new(2, 1))));
}

#[test]
fn test_fragment_only_has_no_vertex_body() {
    let shader = linked("fragment { varying_Fragment = vec4(1.0); }");
    assert!(shader.shader_vertex().is_none());
    assert!(shader.shader_fragment().is_some());
    assert!(shader.stage(Stage::Vertex).is_none());
}

#[test]
fn test_empty_unit_links_without_stages() {
    let shader = linked("");
    assert!(shader.shader_vertex().is_none());
    assert!(shader.shader_fragment().is_none());
    assert_eq!(
        output_names(&shader),
        vec![("out_Position", Stage::Vertex), ("varying_Fragment", Stage::Fragment)]
    );
}

#[test]
fn test_header_input_is_seeded_into_vertex_scope() {
    let shader = linked(
        "vertex { v_uv = vec2(0.5); out_Position = vec4(0.0); }\n\
         fragment(vec2 v_uv) { varying_Fragment = vec4(v_uv, 0.0, 1.0); }",
    );
    let vertex = shader.shader_vertex().expect("vertex stage");
    let v_uv = vertex.output("v_uv").expect("v_uv written by vertex");
    assert_eq!(v_uv.ty, Type::vec(2));
    assert!(output_names(&shader).contains(&("v_uv", Stage::Vertex)));
}

#[test]
fn test_unseeded_name_is_unknown_in_vertex() {
    let err = try_link("vertex { v_uv = vec2(0.5); }\nfragment { }").unwrap_err();
    assert_eq!(err, CompilerError::UnknownIdentifier("v_uv".to_string(), Some(Span::new(1, 10))));
}

#[test]
fn test_unlinked_varying_points_at_fragment_input() {
    let err = try_link("vertex { out_Position = vec4(0.0); }\nfragment(vec3 v_normal) { }").unwrap_err();
    assert!(matches!(err, CompilerError::UnlinkedVarying(ref msg, _) if msg.contains("v_normal")));
    assert_eq!(err.span(), Some(Span::new(2, 15)));

    let err = try_link(
        "varying vec3 v_color;\n\
         vertex { out_Position = vec4(0.0); }\n\
         fragment { varying_Fragment = vec4(v_color, 1.0); }",
    )
    .unwrap_err();
    assert!(matches!(err, CompilerError::UnlinkedVarying(..)));
    assert_eq!(err.span(), Some(Span::new(1, 14)));
}

#[test]
fn test_same_name_different_type_is_a_hard_error() {
    let err = try_link(
        "varying vec3 v_color;\n\
         vertex { v_color = vec3(1.0); }\n\
         fragment(vec4 v_color) { varying_Fragment = v_color; }",
    )
    .unwrap_err();
    assert!(matches!(err, CompilerError::TypeMismatch(..)));
    assert_eq!(err.span(), Some(Span::new(3, 15)));
}

#[test]
fn test_same_name_same_type_links() {
    let shader = linked(
        "varying vec3 v_color;\n\
         vertex { v_color = vec3(1.0); }\n\
         fragment(vec3 v_color) { varying_Fragment = vec4(v_color, 1.0); }",
    );
    // Listed once, at the global declaration
    let names: Vec<_> = output_names(&shader).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["out_Position", "varying_Fragment", "v_color"]);
}

#[test]
fn test_vertex_only_writes_are_not_required_by_fragment() {
    let shader = linked(
        "varying float v_unused;\n\
         vertex { v_unused = 1.0; out_Position = vec4(0.0); }\n\
         fragment { varying_Fragment = vec4(1.0); }",
    );
    assert!(shader.shader_vertex().and_then(|v| v.output("v_unused")).is_some());
    assert!(shader.shader_fragment().map(|f| f.inputs.is_empty()).unwrap_or(false));
}

#[test]
fn test_uniforms_and_outputs_in_declaration_order() {
    let base = BaseScope::standard().with_uniform("u_time", Type::FLOAT);
    let shader = Compiler::with_base_scope(base)
        .compile(
            "uniform mat4 u_mvp;\n\
             varying vec2 v_uv;\n\
             uniform vec4[4] u_lights;\n\
             out vec4 o_normal;\n\
             vertex { v_uv = vec2(u_time); out_Position = u_mvp * vec4(1.0); }\n\
             fragment { varying_Fragment = u_lights[0] * v_uv.x; o_normal = vec4(0.0); }",
        )
        .expect("shader should compile");

    let uniforms: Vec<_> = shader.uniforms().iter().map(|u| (u.name.as_str(), u.ty.to_string())).collect();
    assert_eq!(
        uniforms,
        vec![
            ("u_time", "float".to_string()),
            ("u_mvp", "mat4".to_string()),
            ("u_lights", "vec4[]".to_string()),
        ]
    );
    assert_eq!(
        output_names(&shader),
        vec![
            ("out_Position", Stage::Vertex),
            ("varying_Fragment", Stage::Fragment),
            ("v_uv", Stage::Vertex),
            ("o_normal", Stage::Fragment),
        ]
    );
}

#[test]
fn test_restated_predefined_keeps_global_order() {
    let shader = linked(
        "varying vec2 v_uv;\n\
         vec4 out_Position;\n\
         vertex { v_uv = vec2(0.0); out_Position = vec4(0.0); }\n\
         fragment { varying_Fragment = vec4(v_uv, 0.0, 1.0); }",
    );
    assert_eq!(
        output_names(&shader),
        vec![
            ("varying_Fragment", Stage::Fragment),
            ("v_uv", Stage::Vertex),
            ("out_Position", Stage::Vertex),
        ]
    );
}

#[test]
fn test_properties_survive_linking() {
    let shader = linked("#[blend = \"additive\"]\n#[depth_write = false]\nfragment { }");
    assert_eq!(shader.property("blend"), Some("additive"));
    assert_eq!(shader.property("depth_write"), Some("false"));
    assert_eq!(shader.properties().len(), 2);
}
