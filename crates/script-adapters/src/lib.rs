//! script-adapters: módulos de extracción concretos.
//!
//! Implementaciones `Module` que el motor invoca vía el registro: ingesta de
//! guion crudo, normalización de texto, partición en escenas y configuración
//! de proyecto con gate de confirmación. Son deterministas (sin IO de red);
//! la llamada real a modelo externo queda detrás de la misma frontera.
pub mod macros;
pub mod modules;
pub mod registry;

pub use modules::{ExtractScenesModule, IngestModule, NormalizeModule, ProjectConfigModule};
pub use registry::{standard_registry, standard_schemas};
