use anyhow::Result;

use super::program::{GraphicsContext, ShaderProgram, UniformTable};
use crate::audio::analysis::Analysis;
use crate::error::{CompileError, UniformError};
use crate::uniforms::registry::{
    is_reserved, AUDIO_RMS_UNIFORM, AUDIO_SPECTRUM_UNIFORM, FRAME_TIME_UNIFORM, TIME_UNIFORM,
};
use crate::uniforms::{UniformDescriptor, UniformFormat, UniformValue};

/// Per-frame engine values.
#[derive(Clone, Copy, Debug)]
pub struct FrameInputs<'a> {
    /// Seconds since the viewer started
    pub time: f32,
    /// Seconds since the previous frame
    pub frametime: f32,
    pub analysis: &'a Analysis,
}

/// Holds at most one compiled program and feeds it each frame.
pub struct ShaderViewer<C: GraphicsContext> {
    program: Option<C::Program>,
}

impl<C: GraphicsContext> ShaderViewer<C> {
    pub fn new() -> Self {
        Self { program: None }
    }

    pub fn is_ready(&self) -> bool {
        self.program.is_some()
    }

    /// Compile a new program, replacing the current one. On failure the
    /// viewer is left uncompiled.
    pub fn compile(
        &mut self,
        ctx: &C,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<Vec<UniformDescriptor>, CompileError> {
        self.program = None;

        match ctx.program(vertex_src, fragment_src) {
            Ok(program) => {
                let uniforms = program.uniforms().descriptors();
                log::info!("Shader compiled ({} uniforms)", uniforms.len());
                self.program = Some(program);
                Ok(uniforms)
            }
            Err(err) => {
                log::warn!("{}", err);
                Err(err)
            }
        }
    }

    /// Push engine and user uniforms, then draw. Returns `Ok(false)` when no
    /// program is bound.
    pub fn render(
        &mut self,
        ctx: &C,
        frame: &FrameInputs,
        user: &[UniformDescriptor],
    ) -> Result<bool> {
        let Some(program) = self.program.as_mut() else {
            return Ok(false);
        };

        let table = program.uniforms_mut();
        push_engine_uniforms(table, frame);

        for uniform in user {
            if is_reserved(&uniform.name) || !table.contains(&uniform.name) {
                continue;
            }
            if let Err(err) = table.set(&uniform.name, &uniform.value) {
                log::debug!("Skipping uniform: {}", err);
            }
        }

        ctx.draw(program)?;
        Ok(true)
    }
}

impl<C: GraphicsContext> Default for ShaderViewer<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn push_engine_uniforms(table: &mut UniformTable, frame: &FrameInputs) {
    let scalars = [
        (TIME_UNIFORM, frame.time),
        (FRAME_TIME_UNIFORM, frame.frametime),
        (AUDIO_RMS_UNIFORM, frame.analysis.rms),
    ];
    for (name, value) in scalars {
        if table.contains(name) {
            log_skip(table.set(name, &UniformValue::Scalar(value)));
        }
    }

    let Some(slot) = table.slot(AUDIO_SPECTRUM_UNIFORM) else {
        return;
    };
    if let UniformFormat::FloatArray(len) = slot.format {
        let spectrum = &frame.analysis.spectrum;
        if spectrum.len() >= len {
            log_skip(table.write_floats(AUDIO_SPECTRUM_UNIFORM, &spectrum[..len]));
        }
    } else {
        log::debug!(
            "{} is declared as {}, not a float array",
            AUDIO_SPECTRUM_UNIFORM,
            slot.format
        );
    }
}

fn log_skip(result: Result<(), UniformError>) {
    if let Err(err) = result {
        log::debug!("Skipping uniform: {}", err);
    }
}
