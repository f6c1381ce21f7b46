mod tests_read_only;
