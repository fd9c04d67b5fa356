pub mod csv_plot;

pub use csv_plot::CsvPlot;
