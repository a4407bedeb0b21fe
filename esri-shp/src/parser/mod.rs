//! Parsers des composants d'un shapefile

pub mod cpg;
pub mod dbf;
pub mod prj;
pub mod shp;
pub mod shx;
