//! Macro utilitaria para declarar módulos sin boilerplate.
//!
//! Uso:
//!   declare_module! {
//!       module IngestModule {
//!           id: "ingest",
//!           inputs: [],
//!           outputs: [ArtifactKind::ScreenplaySource],
//!           run(me, inputs, params, ctx) { ... }
//!       }
//!   }

/// Declara un struct unitario que implementa `script_core::Module` con los
/// schemas dados; el cuerpo de `run` debe evaluar a un `ModuleRunResult`.
#[macro_export]
macro_rules! declare_module {
    (
        module $name:ident {
            id: $id:expr,
            inputs: [$($inp:expr),* $(,)?],
            outputs: [$($out:expr),* $(,)?],
            run($self_ident:ident, $inputs_ident:ident, $params_ident:ident, $ctx_ident:ident) $body:block
        }
    ) => {
        #[derive(Clone, Debug, Default)]
        pub struct $name;

        impl $name {
            pub fn new() -> Self {
                Self
            }
        }

        impl ::script_core::Module for $name {
            fn id(&self) -> &str {
                $id
            }

            fn spec(&self) -> ::script_core::ModuleSpec {
                ::script_core::ModuleSpec { input_schemas: vec![$($inp),*],
                                            output_schemas: vec![$($out),*] }
            }

            fn run(&self,
                   $inputs_ident: &::script_core::ModuleInputs,
                   $params_ident: &::serde_json::Value,
                   $ctx_ident: &::script_core::ModuleContext)
                   -> ::script_core::ModuleRunResult {
                let $self_ident = self;
                let _ = $self_ident;
                $body
            }
        }
    };
}
