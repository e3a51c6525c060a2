// SPDX-License-Identifier: CEPL-1.0
use std::{env, fs, path::PathBuf};

// Geometry lives in the uniform block and is indexed per vertex, so the
// pipeline has no vertex input bindings.
const CUBE_VERT: &str = r#"
#version 450
layout(std140, set = 0, binding = 0) uniform Cube {
    mat4 mvp;
    vec4 position[36];
    vec4 attr[36];
} cube;

layout(location = 0) out vec4 texcoord;

void main() {
    texcoord = cube.attr[gl_VertexIndex];
    gl_Position = cube.mvp * cube.position[gl_VertexIndex];
}
"#;

const CUBE_FRAG: &str = r#"
#version 450
layout(set = 0, binding = 1) uniform sampler2D tex;

layout(location = 0) in vec4 texcoord;
layout(location = 0) out vec4 color;

void main() {
    color = texture(tex, texcoord.xy);
}
"#;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    let compiler = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (src, kind, name) in [
        (CUBE_VERT, shaderc::ShaderKind::Vertex, "cube.vert"),
        (CUBE_FRAG, shaderc::ShaderKind::Fragment, "cube.frag"),
    ] {
        let spv = compiler
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())
            .unwrap_or_else(|e| panic!("writing {name}.spv: {e}"));
    }

    println!("cargo:rerun-if-changed=build.rs");
}
