pub mod embedding;
pub mod fetch;
pub mod harvest;
pub mod matching;
pub mod report;
pub mod split;
pub mod table;
