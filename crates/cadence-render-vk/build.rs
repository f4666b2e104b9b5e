use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Unlit vertex shader: no vertex buffers. One triangle from gl_VertexIndex,
    // instances fanned out along x. Layout must match UnlitParams (std140).
    let vs_src = r#"
#version 450
layout(push_constant) uniform Frame { mat4 view_proj; } pc;

layout(set = 0, binding = 0) uniform Material {
    vec4 color;
    mat4 model;
} m;

layout(location = 0) out vec4 vColor;

const vec2 POSITIONS[3] = vec2[](
    vec2( 0.0, -0.5),
    vec2( 0.5,  0.5),
    vec2(-0.5,  0.5)
);

void main() {
    vec2 p = POSITIONS[gl_VertexIndex];
    float offset = float(gl_InstanceIndex) * 1.25;
    vColor = m.color;
    gl_Position = pc.view_proj * m.model * vec4(p.x + offset, p.y, 0.0, 1.0);
}
"#;

    let fs_src = r#"
#version 450
layout(location = 0) in vec4 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vColor;
}
"#;

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();

    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let vs_spv = comp
        .compile_into_spirv(
            vs_src,
            shaderc::ShaderKind::Vertex,
            "unlit.vert",
            "main",
            Some(&opts),
        )
        .unwrap();

    let fs_spv = comp
        .compile_into_spirv(
            fs_src,
            shaderc::ShaderKind::Fragment,
            "unlit.frag",
            "main",
            Some(&opts),
        )
        .unwrap();

    fs::write(out.join("unlit.vert.spv"), vs_spv.as_binary_u8()).unwrap();
    fs::write(out.join("unlit.frag.spv"), fs_spv.as_binary_u8()).unwrap();

    println!("cargo:rerun-if-changed=build.rs");
}
