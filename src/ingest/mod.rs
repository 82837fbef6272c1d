pub mod csv_files;
