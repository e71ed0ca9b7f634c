//! One-time code generation.

use rand::Rng;

pub const CODE_LENGTH: usize = 6;

/// Source of verification codes.
pub trait CodeGenerator: Send {
    /// A fresh `CODE_LENGTH`-digit code.
    fn generate(&mut self) -> String;
}

/// Uniform codes in `100000..=999999`.
///
/// Unpredictability over a 60 s, 3-attempt window is all that is needed;
/// collisions are not checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&mut self) -> String {
        rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
    }
}

/// Exactly six ASCII digits.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Hands out a fixed list of codes, then falls back to random ones.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct ScriptedCodeGenerator {
    codes: std::collections::VecDeque<String>,
}

#[cfg(any(test, feature = "test-utils"))]
impl ScriptedCodeGenerator {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl CodeGenerator for ScriptedCodeGenerator {
    fn generate(&mut self) -> String {
        self.codes
            .pop_front()
            .unwrap_or_else(|| RandomCodeGenerator.generate())
    }
}
