mod helpers;

mod tests_query;
