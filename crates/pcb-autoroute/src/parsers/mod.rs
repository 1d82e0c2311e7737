pub mod kicad;
pub mod kicad_sexpr;
