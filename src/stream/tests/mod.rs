mod allocator_tests;
