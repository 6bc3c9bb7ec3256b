use tsdbg_sourcemap::PositionMapRegistry;

use crate::vm::{BreakpointTarget, CallFrame};

/// Source position a frame maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: String,
    pub line: u32,
    pub column: u32,
}

/// Call frame with its emitted location and, when mapped, its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Position in the stack, 0 is the innermost frame
    pub id: usize,
    pub name: String,
    pub script: BreakpointTarget,
    pub emitted_line: u32,
    pub emitted_column: u32,
    pub source: Option<SourceLocation>,
}

impl StackFrame {
    pub fn translate(id: usize, frame: &CallFrame, registry: &PositionMapRegistry) -> Self {
        let source = frame
            .script
            .script_name()
            .and_then(|script| registry.by_emitted(script))
            .and_then(|map| {
                let item = map.item_by_emitted_line(frame.line)?;
                Some(SourceLocation {
                    path: map.source_path(item)?.to_string(),
                    line: item.source_line,
                    column: item.source_column,
                })
            });

        Self {
            id,
            name: frame.function_name.clone(),
            script: frame.script.clone(),
            emitted_line: frame.line,
            emitted_column: frame.column,
            source,
        }
    }

    pub fn translate_all(frames: &[CallFrame], registry: &PositionMapRegistry) -> Vec<Self> {
        frames
            .iter()
            .enumerate()
            .map(|(id, frame)| Self::translate(id, frame, registry))
            .collect()
    }

    /// Line to present: the source line when mapped, the emitted line otherwise.
    pub fn line(&self) -> u32 {
        self.source
            .as_ref()
            .map(|source| source.line)
            .unwrap_or(self.emitted_line)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tsdbg_sourcemap::SiblingMapLocator;

    use super::*;

    fn frame(script: BreakpointTarget, line: u32) -> CallFrame {
        CallFrame {
            function_name: "handler".to_string(),
            script,
            line,
            column: 2,
        }
    }

    fn registry_with_map() -> (tempfile::TempDir, PositionMapRegistry) {
        let dir = tempfile::tempdir().unwrap();
        // app.js line 1 -> app.ts line 1, app.js line 2 -> app.ts line 3
        fs::write(
            dir.path().join("app.js.map"),
            r#"{"version":3,"file":"app.js","sources":["app.ts"],"mappings":"AAAA;AAEA"}"#,
        )
        .unwrap();
        let registry = PositionMapRegistry::new(Box::new(SiblingMapLocator::default()));
        registry
            .resolve(&dir.path().join("app.ts").to_string_lossy())
            .unwrap();
        (dir, registry)
    }

    #[test]
    fn test_translate_mapped_frame() {
        let (_dir, registry) = registry_with_map();
        let frame = StackFrame::translate(
            0,
            &frame(BreakpointTarget::ScriptName("app.js".to_string()), 2),
            &registry,
        );

        assert_eq!(
            frame.source,
            Some(SourceLocation {
                path: "app.ts".to_string(),
                line: 3,
                column: 0
            })
        );
        assert_eq!(frame.line(), 3);
        assert_eq!(frame.emitted_column, 2);
    }

    #[test]
    fn test_translate_unmapped_frames() {
        let (_dir, registry) = registry_with_map();
        let frames = StackFrame::translate_all(
            &[
                frame(BreakpointTarget::ScriptName("app.js".to_string()), 9),
                frame(BreakpointTarget::ScriptName("vendor.js".to_string()), 1),
                frame(BreakpointTarget::ScriptId(4), 1),
                frame(BreakpointTarget::Unknown, 1),
            ],
            &registry,
        );

        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|frame| frame.source.is_none()));
        assert_eq!(frames.iter().map(|f| f.id).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(frames[0].line(), 9);
    }
}
