//! WGSL synthesis: one complete compute shader per parameter fingerprint.
//!
//! The generator is a pure function of [`Parameters`]; everything that can
//! vary per dispatch (p, strides, normalization, uv mapping) arrives through
//! the uniform block instead, so one compiled pipeline serves every pass
//! that shares a fingerprint.
//!
//! Kernel families:
//! * radix 2/4/8 — register butterflies, one or more per thread;
//! * radix 16/64 — two sub-stages (4x4, 8x8) exchanging through workgroup
//!   shared memory, optionally with banked row padding;
//! * resolve kernels — the Hermitian combine/split at the real/complex
//!   boundary of R2C/C2R plans.

use crate::options::shared_sub_radix;
use crate::types::{Direction, Mode, Parameters, Target};
use std::fmt::Write;

/// Host-side mirror of the `PassUniforms` block in every generated shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassUniforms {
    /// Stockham p for this stage; unused by resolve kernels.
    pub p: u32,
    /// Transform length along the pass axis, in complex elements. Resolve
    /// kernels receive the half-length here.
    pub n_axis: u32,
    pub in_stride: u32,
    pub in_line_stride: u32,
    pub out_stride: u32,
    pub out_line_stride: u32,
    pub lines: u32,
    pub norm_scale: f32,
    pub uv_offset: [f32; 2],
    pub uv_scale: [f32; 2],
}

pub const ENTRY_POINT: &str = "main";

/// Generate the WGSL source for one fingerprint.
pub fn source(params: &Parameters) -> String {
    let mut s = String::new();
    let mode = params.mode();
    let dual = mode.is_dual();
    let ct = if dual { "vec4<f32>" } else { "vec2<f32>" };

    header(&mut s, params);
    declarations(&mut s, params);
    helpers(&mut s, params);
    load_store(&mut s, params, ct);

    if mode.is_resolve() {
        resolve_body(&mut s, params);
    } else if let Some(sub) = shared_sub_radix(params.radix) {
        dft_functions(&mut s, sub, ct);
        shared_body(&mut s, params, sub, ct);
    } else {
        dft_functions(&mut s, params.radix, ct);
        register_body(&mut s, params);
    }

    s
}

fn header(s: &mut String, params: &Parameters) {
    let dir = params.direction().sign();
    let _ = writeln!(s, "const RADIX: u32 = {}u;", params.radix);
    let _ = writeln!(s, "const CPT: u32 = {}u;", params.complexes_per_thread());
    let _ = writeln!(s, "const DIR: f32 = {dir:.1};");
    s.push('\n');
    s.push_str(
        "struct PassUniforms {\n\
         \x20   p: u32,\n\
         \x20   n_axis: u32,\n\
         \x20   in_stride: u32,\n\
         \x20   in_line_stride: u32,\n\
         \x20   out_stride: u32,\n\
         \x20   out_line_stride: u32,\n\
         \x20   lines: u32,\n\
         \x20   norm_scale: f32,\n\
         \x20   uv_offset: vec2<f32>,\n\
         \x20   uv_scale: vec2<f32>,\n\
         }\n\n\
         @group(0) @binding(0) var<uniform> pass_data: PassUniforms;\n\n",
    );
}

fn ssbo_element(dual: bool, fp16: bool) -> &'static str {
    match (dual, fp16) {
        (false, false) => "vec2<f32>",
        (false, true) => "u32",
        (true, false) => "vec4<f32>",
        (true, true) => "vec2<u32>",
    }
}

pub(crate) fn storage_format(params: &Parameters) -> &'static str {
    match params.output_target() {
        Target::ImageReal => "r32float",
        Target::Image => {
            if params.output_fp16 != 0 {
                "rgba16float"
            } else if params.mode().is_dual() {
                "rgba32float"
            } else {
                "rg32float"
            }
        }
        Target::Ssbo => unreachable!("buffer outputs have no texel format"),
    }
}

fn declarations(s: &mut String, params: &Parameters) {
    let dual = params.mode().is_dual();

    match params.input_target() {
        Target::Ssbo => {
            let elem = ssbo_element(dual, params.input_fp16 != 0);
            let _ = writeln!(
                s,
                "@group(1) @binding(0) var<storage, read> src: array<{elem}>;"
            );
        }
        Target::Image | Target::ImageReal => {
            s.push_str("@group(1) @binding(0) var src_tex: texture_2d<f32>;\n");
            s.push_str("@group(1) @binding(1) var src_sampler: sampler;\n");
        }
    }

    match params.output_target() {
        Target::Ssbo => {
            let elem = ssbo_element(dual, params.output_fp16 != 0);
            let _ = writeln!(
                s,
                "@group(1) @binding(2) var<storage, read_write> dst: array<{elem}>;"
            );
        }
        Target::Image | Target::ImageReal => {
            let _ = writeln!(
                s,
                "@group(1) @binding(2) var dst_tex: texture_storage_2d<{}, write>;",
                storage_format(params)
            );
        }
    }

    if convolve_fused(params) {
        let elem = ssbo_element(dual, params.input_fp16 != 0);
        let _ = writeln!(
            s,
            "@group(1) @binding(3) var<storage, read> aux: array<{elem}>;"
        );
    }
    s.push('\n');
}

fn convolve_fused(params: &Parameters) -> bool {
    params.aux_input()
}

fn helpers(s: &mut String, params: &Parameters) {
    let dual = params.mode().is_dual();

    if dual {
        s.push_str(
            "fn ctw(v: vec4<f32>, w: vec2<f32>) -> vec4<f32> {\n\
             \x20   return vec4<f32>(\n\
             \x20       v.x * w.x - v.y * w.y, v.x * w.y + v.y * w.x,\n\
             \x20       v.z * w.x - v.w * w.y, v.z * w.y + v.w * w.x);\n\
             }\n\n\
             fn rot90(v: vec4<f32>) -> vec4<f32> {\n\
             \x20   return DIR * vec4<f32>(-v.y, v.x, -v.w, v.z);\n\
             }\n\n",
        );
    } else {
        s.push_str(
            "fn ctw(v: vec2<f32>, w: vec2<f32>) -> vec2<f32> {\n\
             \x20   return vec2<f32>(v.x * w.x - v.y * w.y, v.x * w.y + v.y * w.x);\n\
             }\n\n\
             fn rot90(v: vec2<f32>) -> vec2<f32> {\n\
             \x20   return DIR * vec2<f32>(-v.y, v.x);\n\
             }\n\n",
        );
    }

    s.push_str(
        "fn twiddle(k: u32, n: u32) -> vec2<f32> {\n\
         \x20   let phase = DIR * 6.283185307179586 * f32(k) / f32(n);\n\
         \x20   return vec2<f32>(cos(phase), sin(phase));\n\
         }\n\n",
    );

    if params.mode().is_resolve() {
        s.push_str(
            "fn conj(v: vec2<f32>) -> vec2<f32> {\n\
             \x20   return vec2<f32>(v.x, -v.y);\n\
             }\n\n\
             fn mul_neg_j(v: vec2<f32>) -> vec2<f32> {\n\
             \x20   return vec2<f32>(v.y, -v.x);\n\
             }\n\n\
             fn mul_j(v: vec2<f32>) -> vec2<f32> {\n\
             \x20   return vec2<f32>(-v.y, v.x);\n\
             }\n\n",
        );
    }
}

/// Emit `load_src`, `store_dst` and (for fused convolution) `load_aux`,
/// all in terms of (axis element index, line index).
fn load_store(s: &mut String, params: &Parameters, ct: &str) {
    let dual = params.mode().is_dual();
    let vertical = params.mode().is_vertical();

    match params.input_target() {
        Target::Ssbo => {
            let _ = writeln!(s, "fn load_src(i: u32, line: u32) -> {ct} {{");
            s.push_str(
                "    let l = min(line, pass_data.lines - 1u);\n\
                 \x20   let idx = l * pass_data.in_line_stride + i * pass_data.in_stride;\n",
            );
            s.push_str(&unpack_expr("src[idx]", dual, params.input_fp16 != 0));
            s.push_str("}\n\n");
        }
        Target::Image => {
            let coord = if vertical { "vec2<f32>(f32(line), f32(i))" } else { "vec2<f32>(f32(i), f32(line))" };
            let swizzle = if dual { "" } else { ".xy" };
            let _ = writeln!(
                s,
                "fn load_src(i: u32, line: u32) -> {ct} {{\n\
                 \x20   let uv = ({coord} + vec2<f32>(0.5)) * pass_data.uv_scale + pass_data.uv_offset;\n\
                 \x20   return textureSampleLevel(src_tex, src_sampler, uv, 0.0){swizzle};\n\
                 }}\n"
            );
        }
        Target::ImageReal => {
            // Each complex element packs two adjacent real texels.
            s.push_str(
                "fn load_src(i: u32, line: u32) -> vec2<f32> {\n\
                 \x20   let c0 = (vec2<f32>(f32(2u * i), f32(line)) + vec2<f32>(0.5)) * pass_data.uv_scale + pass_data.uv_offset;\n\
                 \x20   let c1 = (vec2<f32>(f32(2u * i + 1u), f32(line)) + vec2<f32>(0.5)) * pass_data.uv_scale + pass_data.uv_offset;\n\
                 \x20   let r0 = textureSampleLevel(src_tex, src_sampler, c0, 0.0).x;\n\
                 \x20   let r1 = textureSampleLevel(src_tex, src_sampler, c1, 0.0).x;\n\
                 \x20   return vec2<f32>(r0, r1);\n\
                 }\n\n",
            );
        }
    }

    if convolve_fused(params) {
        let _ = writeln!(s, "fn load_aux(i: u32, line: u32) -> {ct} {{");
        s.push_str(
            "    let l = min(line, pass_data.lines - 1u);\n\
             \x20   let idx = l * pass_data.in_line_stride + i * pass_data.in_stride;\n",
        );
        s.push_str(&unpack_expr("aux[idx]", dual, params.input_fp16 != 0));
        s.push_str("}\n\n");
    }

    match params.output_target() {
        Target::Ssbo => {
            let _ = writeln!(s, "fn store_dst(i: u32, line: u32, v: {ct}) {{");
            s.push_str(
                "    let idx = line * pass_data.out_line_stride + i * pass_data.out_stride;\n",
            );
            s.push_str(&pack_stmt(dual, params.output_fp16 != 0));
            s.push_str("}\n\n");
        }
        Target::Image => {
            let coord = if vertical { "vec2<i32>(i32(line), i32(i))" } else { "vec2<i32>(i32(i), i32(line))" };
            let value = if dual { "v" } else { "vec4<f32>(v, 0.0, 0.0)" };
            let _ = writeln!(
                s,
                "fn store_dst(i: u32, line: u32, v: {ct}) {{\n\
                 \x20   textureStore(dst_tex, {coord}, {value});\n\
                 }}\n"
            );
        }
        Target::ImageReal => {
            let (c0, c1) = if vertical {
                ("vec2<i32>(i32(2u * line), i32(i))", "vec2<i32>(i32(2u * line + 1u), i32(i))")
            } else {
                ("vec2<i32>(i32(2u * i), i32(line))", "vec2<i32>(i32(2u * i + 1u), i32(line))")
            };
            let _ = writeln!(
                s,
                "fn store_dst(i: u32, line: u32, v: vec2<f32>) {{\n\
                 \x20   textureStore(dst_tex, {c0}, vec4<f32>(v.x, 0.0, 0.0, 0.0));\n\
                 \x20   textureStore(dst_tex, {c1}, vec4<f32>(v.y, 0.0, 0.0, 0.0));\n\
                 }}\n"
            );
        }
    }
}

fn unpack_expr(access: &str, dual: bool, fp16: bool) -> String {
    match (dual, fp16) {
        (_, false) => format!("    return {access};\n"),
        (false, true) => format!("    return unpack2x16float({access});\n"),
        (true, true) => format!(
            "    let w = {access};\n\
             \x20   return vec4<f32>(unpack2x16float(w.x), unpack2x16float(w.y));\n"
        ),
    }
}

fn pack_stmt(dual: bool, fp16: bool) -> String {
    match (dual, fp16) {
        (_, false) => "    dst[idx] = v;\n".to_string(),
        (false, true) => "    dst[idx] = pack2x16float(v);\n".to_string(),
        (true, true) => {
            "    dst[idx] = vec2<u32>(pack2x16float(v.xy), pack2x16float(v.zw));\n".to_string()
        }
    }
}

/// Emit `dftN` for the requested radix (plus the radix-4 helper when the
/// radix-8 kernel needs it).
fn dft_functions(s: &mut String, radix: u32, ct: &str) {
    if radix == 2 {
        let _ = writeln!(
            s,
            "fn dft2(z: ptr<function, array<{ct}, 2>>) {{\n\
             \x20   let a = (*z)[0];\n\
             \x20   let b = (*z)[1];\n\
             \x20   (*z)[0] = a + b;\n\
             \x20   (*z)[1] = a - b;\n\
             }}\n"
        );
    }
    if radix == 4 || radix == 8 {
        let _ = writeln!(
            s,
            "fn dft4(z: ptr<function, array<{ct}, 4>>) {{\n\
             \x20   let t0 = (*z)[0] + (*z)[2];\n\
             \x20   let t1 = (*z)[0] - (*z)[2];\n\
             \x20   let t2 = (*z)[1] + (*z)[3];\n\
             \x20   let t3 = rot90((*z)[1] - (*z)[3]);\n\
             \x20   (*z)[0] = t0 + t2;\n\
             \x20   (*z)[2] = t0 - t2;\n\
             \x20   (*z)[1] = t1 + t3;\n\
             \x20   (*z)[3] = t1 - t3;\n\
             }}\n"
        );
    }
    if radix == 8 {
        let _ = writeln!(
            s,
            "const W8_1: vec2<f32> = vec2<f32>(0.70710678118, DIR * 0.70710678118);\n\
             const W8_3: vec2<f32> = vec2<f32>(-0.70710678118, DIR * 0.70710678118);\n\n\
             fn dft8(z: ptr<function, array<{ct}, 8>>) {{\n\
             \x20   var e: array<{ct}, 4>;\n\
             \x20   var o: array<{ct}, 4>;\n\
             \x20   for (var a = 0u; a < 4u; a = a + 1u) {{\n\
             \x20       e[a] = (*z)[2u * a];\n\
             \x20       o[a] = (*z)[2u * a + 1u];\n\
             \x20   }}\n\
             \x20   dft4(&e);\n\
             \x20   dft4(&o);\n\
             \x20   o[1] = ctw(o[1], W8_1);\n\
             \x20   o[2] = rot90(o[2]);\n\
             \x20   o[3] = ctw(o[3], W8_3);\n\
             \x20   for (var a = 0u; a < 4u; a = a + 1u) {{\n\
             \x20       (*z)[a] = e[a] + o[a];\n\
             \x20       (*z)[a + 4u] = e[a] - o[a];\n\
             }}\n\
             }}\n"
        );
    }
}

fn workgroup_attribute(params: &Parameters) -> String {
    format!(
        "@compute @workgroup_size({}, {}, 1)",
        params.workgroup_size_x, params.workgroup_size_y
    )
}

/// Axis/line index expressions for the current orientation.
fn orientation(params: &Parameters) -> (&'static str, &'static str, &'static str, &'static str) {
    if params.mode().is_vertical() {
        ("gid.y", "gid.x", "lid.y", "lid.x")
    } else {
        ("gid.x", "gid.y", "lid.x", "lid.y")
    }
}

fn convolve_stmt(params: &Parameters, value: &str, index: &str) -> String {
    if convolve_fused(params) {
        let mul = if params.mode().is_dual() {
            format!(
                "let f = load_aux({index}, line);\n\
                 \x20           {value} = vec4<f32>(\n\
                 \x20               {value}.x * f.x - {value}.y * f.y, {value}.x * f.y + {value}.y * f.x,\n\
                 \x20               {value}.z * f.z - {value}.w * f.w, {value}.z * f.w + {value}.w * f.z);"
            )
        } else {
            format!(
                "let f = load_aux({index}, line);\n\
                 \x20           {value} = ctw({value}, f);"
            )
        };
        format!("            {mul}\n")
    } else {
        String::new()
    }
}

fn register_body(s: &mut String, params: &Parameters) {
    let (axis, line, _, _) = orientation(params);
    let radix = params.radix;
    let convolve = convolve_stmt(params, "z[a]", "i + a * m");
    let attr = workgroup_attribute(params);

    let _ = writeln!(
        s,
        "{attr}\n\
         fn main(@builtin(global_invocation_id) gid: vec3<u32>,\n\
         \x20       @builtin(local_invocation_id) lid: vec3<u32>) {{\n\
         \x20   let line = {line};\n\
         \x20   if (line >= pass_data.lines) {{\n\
         \x20       return;\n\
         \x20   }}\n\
         \x20   let m = pass_data.n_axis / RADIX;\n\
         \x20   let t0 = {axis} * CPT;\n\
         \x20   for (var c = 0u; c < CPT; c = c + 1u) {{\n\
         \x20       let i = t0 + c;\n\
         \x20       let k = i % pass_data.p;\n\
         \x20       var z: array<{ct}, {radix}>;\n\
         \x20       for (var a = 0u; a < RADIX; a = a + 1u) {{\n\
         \x20           z[a] = load_src(i + a * m, line);\n\
         {convolve}\
         \x20       }}\n\
         \x20       for (var a = 1u; a < RADIX; a = a + 1u) {{\n\
         \x20           z[a] = ctw(z[a], twiddle(a * k, RADIX * pass_data.p));\n\
         \x20       }}\n\
         \x20       dft{radix}(&z);\n\
         \x20       let j = (i / pass_data.p) * (RADIX * pass_data.p) + k;\n\
         \x20       for (var a = 0u; a < RADIX; a = a + 1u) {{\n\
         \x20           store_dst(j + a * pass_data.p, line, z[a] * pass_data.norm_scale);\n\
         \x20       }}\n\
         \x20   }}\n\
         }}",
        ct = if params.mode().is_dual() { "vec4<f32>" } else { "vec2<f32>" },
    );
}

fn shared_body(s: &mut String, params: &Parameters, sub: u32, ct: &str) {
    let (axis, line, axis_local, line_local) = orientation(params);
    let banked = params.shared_banked != 0;
    let row = if banked { sub + 1 } else { sub };
    let axis_wg = if params.mode().is_vertical() {
        params.workgroup_size_y
    } else {
        params.workgroup_size_x
    };
    let transverse_wg = if params.mode().is_vertical() {
        params.workgroup_size_x
    } else {
        params.workgroup_size_y
    };
    let groups_per_wg = axis_wg / sub;
    let cpt = params.complexes_per_thread();
    let shared_len = transverse_wg * groups_per_wg * cpt * sub * row;
    let convolve = convolve_stmt(params, "v", "i + a * m");
    let attr = workgroup_attribute(params);

    let _ = writeln!(s, "const SUB: u32 = {sub}u;");
    let _ = writeln!(s, "const ROW: u32 = {row}u;");
    let _ = writeln!(s, "const GROUPS_PER_WG: u32 = {groups_per_wg}u;");
    let _ = writeln!(s, "var<workgroup> stage: array<{ct}, {shared_len}>;\n");

    // Inactive transverse threads clamp their loads and skip their stores
    // but still arrive at both barriers.
    let _ = writeln!(
        s,
        "{attr}\n\
         fn main(@builtin(global_invocation_id) gid: vec3<u32>,\n\
         \x20       @builtin(local_invocation_id) lid: vec3<u32>) {{\n\
         \x20   let line = {line};\n\
         \x20   let is_active = line < pass_data.lines;\n\
         \x20   let lane = {axis} % SUB;\n\
         \x20   let bgroup = {axis} / SUB;\n\
         \x20   let local_group = {axis_local} / SUB;\n\
         \x20   let m = pass_data.n_axis / RADIX;\n\
         \x20   let base = ({line_local} * GROUPS_PER_WG * CPT + local_group * CPT) * (SUB * ROW);\n\
         \x20   for (var c = 0u; c < CPT; c = c + 1u) {{\n\
         \x20       let i = bgroup * CPT + c;\n\
         \x20       let k = i % pass_data.p;\n\
         \x20       let cbase = base + c * (SUB * ROW);\n\
         \x20       var z: array<{ct}, {sub}>;\n\
         \x20       for (var a1 = 0u; a1 < SUB; a1 = a1 + 1u) {{\n\
         \x20           let a = SUB * a1 + lane;\n\
         \x20           var v = load_src(i + a * m, line);\n\
         {convolve}\
         \x20           v = ctw(v, twiddle(a * k, RADIX * pass_data.p));\n\
         \x20           z[a1] = v;\n\
         \x20       }}\n\
         \x20       dft{sub}(&z);\n\
         \x20       for (var k0 = 0u; k0 < SUB; k0 = k0 + 1u) {{\n\
         \x20           stage[cbase + lane * ROW + k0] = ctw(z[k0], twiddle(lane * k0, RADIX));\n\
         \x20       }}\n\
         \x20       workgroupBarrier();\n\
         \x20       var y: array<{ct}, {sub}>;\n\
         \x20       for (var a0 = 0u; a0 < SUB; a0 = a0 + 1u) {{\n\
         \x20           y[a0] = stage[cbase + a0 * ROW + lane];\n\
         \x20       }}\n\
         \x20       dft{sub}(&y);\n\
         \x20       if (is_active) {{\n\
         \x20           let j = (i / pass_data.p) * (RADIX * pass_data.p) + k;\n\
         \x20           for (var k1 = 0u; k1 < SUB; k1 = k1 + 1u) {{\n\
         \x20               store_dst(j + (SUB * k1 + lane) * pass_data.p, line, y[k1] * pass_data.norm_scale);\n\
         \x20           }}\n\
         \x20       }}\n\
         \x20       workgroupBarrier();\n\
         \x20   }}\n\
         }}"
    );
}

fn resolve_body(s: &mut String, params: &Parameters) {
    let attr = workgroup_attribute(params);
    match params.mode() {
        Mode::ResolveRealToComplex => {
            // X[k] = E[k] + W_N^k O[k] over the packed half-length spectrum;
            // thread 0 also writes the Nyquist element.
            let _ = writeln!(
                s,
                "{attr}\n\
                 fn main(@builtin(global_invocation_id) gid: vec3<u32>,\n\
                 \x20       @builtin(local_invocation_id) lid: vec3<u32>) {{\n\
                 \x20   let half_n = pass_data.n_axis;\n\
                 \x20   let k = gid.x;\n\
                 \x20   let line = gid.y;\n\
                 \x20   if (k >= half_n || line >= pass_data.lines) {{\n\
                 \x20       return;\n\
                 \x20   }}\n\
                 \x20   let partner_line = (pass_data.lines - line) % pass_data.lines;\n\
                 \x20   let zk = load_src(k, line);\n\
                 \x20   let zp = conj(load_src((half_n - k) % half_n, partner_line));\n\
                 \x20   let e = 0.5 * (zk + zp);\n\
                 \x20   let o = 0.5 * mul_neg_j(zk - zp);\n\
                 \x20   store_dst(k, line, e + ctw(o, twiddle(k, 2u * half_n)));\n\
                 \x20   if (k == 0u) {{\n\
                 \x20       store_dst(half_n, line, e - o);\n\
                 \x20   }}\n\
                 }}"
            );
        }
        Mode::ResolveComplexToReal => {
            // Split the Hermitian spectrum back into the packed half-length
            // field ahead of the inverse passes.
            let _ = writeln!(
                s,
                "{attr}\n\
                 fn main(@builtin(global_invocation_id) gid: vec3<u32>,\n\
                 \x20       @builtin(local_invocation_id) lid: vec3<u32>) {{\n\
                 \x20   let half_n = pass_data.n_axis;\n\
                 \x20   let k = gid.x;\n\
                 \x20   let line = gid.y;\n\
                 \x20   if (k >= half_n || line >= pass_data.lines) {{\n\
                 \x20       return;\n\
                 \x20   }}\n\
                 \x20   let partner_line = (pass_data.lines - line) % pass_data.lines;\n\
                 \x20   let xk = load_src(k, line);\n\
                 \x20   let xp = conj(load_src(half_n - k, partner_line));\n\
                 \x20   let e = 0.5 * (xk + xp);\n\
                 \x20   let wo = 0.5 * (xk - xp);\n\
                 \x20   let o = ctw(wo, twiddle(k, 2u * half_n));\n\
                 \x20   store_dst(k, line, e + mul_j(o));\n\
                 }}"
            );
        }
        _ => unreachable!("resolve body requested for a Stockham mode"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Performance, Precision};

    fn parse(params: &Parameters) {
        let src = source(params);
        let module = match naga::front::wgsl::parse_str(&src) {
            Ok(module) => module,
            Err(e) => panic!("generated WGSL failed to parse: {e}\n---\n{src}"),
        };
        let result = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module);
        if let Err(e) = result {
            panic!("generated WGSL failed validation: {e:?}\n---\n{src}");
        }
    }

    fn perf(wg_x: u32, wg_y: u32, vector: u32, banked: bool) -> Performance {
        Performance {
            workgroup_size_x: wg_x,
            workgroup_size_y: wg_y,
            vector_size: vector,
            shared_banked: banked,
        }
    }

    #[test]
    fn register_kernels_parse() {
        for radix in [2u32, 4, 8] {
            for mode in [Mode::Horizontal, Mode::Vertical, Mode::HorizontalDual, Mode::VerticalDual] {
                let params = Parameters::new(
                    perf(4, 1, 2, false),
                    Precision::default(),
                    radix,
                    Direction::Forward,
                    mode,
                    Target::Ssbo,
                    Target::Ssbo,
                    true,
                    false,
                );
                parse(&params);
            }
        }
    }

    #[test]
    fn shared_kernels_parse() {
        for (radix, wg) in [(16u32, 8u32), (64, 8)] {
            for banked in [false, true] {
                let params = Parameters::new(
                    perf(wg, 1, 2, banked),
                    Precision::default(),
                    radix,
                    Direction::Inverse,
                    Mode::Horizontal,
                    Target::Ssbo,
                    Target::Ssbo,
                    false,
                    true,
                );
                parse(&params);
            }
        }
    }

    #[test]
    fn image_paths_parse() {
        let sampled = Parameters::new(
            perf(4, 1, 2, false),
            Precision::default(),
            4,
            Direction::Forward,
            Mode::Horizontal,
            Target::Image,
            Target::Ssbo,
            true,
            false,
        );
        parse(&sampled);

        let real_in = Parameters::new(
            perf(4, 1, 2, false),
            Precision::default(),
            4,
            Direction::Forward,
            Mode::Horizontal,
            Target::ImageReal,
            Target::Ssbo,
            true,
            false,
        );
        parse(&real_in);

        let image_out = Parameters::new(
            perf(4, 1, 2, false),
            Precision::default(),
            4,
            Direction::Forward,
            Mode::HorizontalDual,
            Target::Ssbo,
            Target::Image,
            false,
            true,
        );
        parse(&image_out);

        let real_out = Parameters::new(
            perf(4, 1, 2, false),
            Precision::default(),
            4,
            Direction::Inverse,
            Mode::Vertical,
            Target::Ssbo,
            Target::ImageReal,
            false,
            true,
        );
        parse(&real_out);
    }

    #[test]
    fn fp16_storage_parses() {
        let precision = Precision {
            fp16: true,
            input_fp16: true,
            output_fp16: true,
            normalize: false,
        };
        for mode in [Mode::Horizontal, Mode::HorizontalDual] {
            let params = Parameters::new(
                perf(8, 1, 8, false),
                precision,
                8,
                Direction::Forward,
                mode,
                Target::Ssbo,
                Target::Ssbo,
                true,
                false,
            );
            parse(&params);
        }
    }

    #[test]
    fn convolve_fusion_parses_and_binds_aux() {
        let params = Parameters::new(
            perf(4, 1, 2, false),
            Precision::default(),
            8,
            Direction::InverseConvolve,
            Mode::Horizontal,
            Target::Ssbo,
            Target::Ssbo,
            true,
            false,
        );
        let src = source(&params);
        assert!(src.contains("@binding(3)"));
        parse(&params);
    }

    #[test]
    fn resolve_kernels_parse() {
        for (mode, dir) in [
            (Mode::ResolveRealToComplex, Direction::Forward),
            (Mode::ResolveComplexToReal, Direction::Inverse),
        ] {
            let params = Parameters::new(
                perf(4, 1, 2, false),
                Precision::default(),
                2,
                dir,
                mode,
                Target::Ssbo,
                Target::Ssbo,
                false,
                false,
            );
            parse(&params);
        }
    }

    #[test]
    fn uniform_block_matches_host_layout() {
        assert_eq!(std::mem::size_of::<PassUniforms>(), 48);
    }

    #[test]
    fn p1_and_direction_change_the_source() {
        let base = Parameters::new(
            perf(4, 1, 2, false),
            Precision::default(),
            4,
            Direction::InverseConvolve,
            Mode::Horizontal,
            Target::Ssbo,
            Target::Ssbo,
            true,
            false,
        );
        let mut interior = base;
        interior.p1 = 0;
        // Convolution is fused only into the first pass.
        assert!(source(&base).contains("load_aux"));
        assert!(!source(&interior).contains("load_aux"));
    }
}
